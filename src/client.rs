//! Blocking HTTP client for the Tado API (subset used by the daemon).
//!
//! - Blocking client using `ureq` (no async).
//! - Uses the models in `crate::models::tado`.
//!
//! Authentication
//! - OAuth2 device-code flow against the Tado login service: a device
//!   authorization request yields a user-facing verification URL, then the
//!   token endpoint is polled until the user approves (or the code expires).
//! - A successful grant persists the rotating refresh token through
//!   [`TokenStore`], so later runs skip the interactive step entirely.
//! - Bearer tokens refresh automatically shortly before expiry, plus one
//!   forced refresh-and-retry on HTTP 401.

use log::warn;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::time::{Duration, Instant};

use crate::interrupt::Interrupt;
use crate::models::tado::*;
use crate::token::TokenStore;

const BASE_URL: &str = "https://my.tado.com/api/v2";
const OAUTH_TOKEN_URL: &str = "https://login.tado.com/oauth2/token";
const DEVICE_AUTHORIZE_URL: &str = "https://login.tado.com/oauth2/device_authorize";
const OAUTH_CLIENT_ID: &str = "1bb50063-6b0c-4d11-bd99-387f4a91cc46";
const OAUTH_SCOPE: &str = "offline_access";
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Refresh the bearer this long before its reported expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum TadoClientError {
    Transport(String),
    Http { status: u16, message: String },
    Json(String),
    Auth(String),
    NotAuthenticated,
    Interrupted,
}

impl core::fmt::Display for TadoClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TadoClientError::Transport(s) => write!(f, "transport error: {}", s),
            TadoClientError::Http { status, message } => write!(f, "http {}: {}", status, message),
            TadoClientError::Json(e) => write!(f, "json error: {}", e),
            TadoClientError::Auth(e) => write!(f, "auth error: {}", e),
            TadoClientError::NotAuthenticated => write!(f, "not authenticated; complete device activation first"),
            TadoClientError::Interrupted => write!(f, "interrupted by user"),
        }
    }
}

impl std::error::Error for TadoClientError {}

/// The capability surface the control loop consumes.
///
/// `TadoClient` is the production implementation; tests drive the evaluators
/// through a recording fake instead.
pub trait TadoApi {
    fn device_activation_status(&self) -> DeviceActivationStatus;
    fn device_verification_url(&self) -> Option<String>;
    /// Blocks until the user approves the device code, it expires, or the
    /// process is interrupted.
    fn device_activation(&self) -> Result<(), TadoClientError>;

    fn get_home_state(&self) -> Result<HomeState, TadoClientError>;
    fn get_mobile_devices(&self) -> Result<Vec<MobileDevice>, TadoClientError>;
    fn set_home(&self) -> Result<(), TadoClientError>;
    fn set_away(&self) -> Result<(), TadoClientError>;

    fn get_zones(&self) -> Result<Vec<Zone>, TadoClientError>;
    fn get_zone_state(&self, zone: ZoneId) -> Result<ZoneState, TadoClientError>;
    fn get_open_window_detected(&self, zone: ZoneId) -> Result<OpenWindowDetected, TadoClientError>;
    fn set_open_window(&self, zone: ZoneId) -> Result<(), TadoClientError>;
    /// `duration_secs == 0` means an indefinite (manual) override.
    fn set_zone_overlay(&self, zone: ZoneId, duration_secs: i64, celsius: f64) -> Result<(), TadoClientError>;
}

#[derive(Debug, Clone)]
struct OAuthToken {
    access_token: String,
    expires_at: Instant,
    refresh_token: Option<String>,
}

/// One device-code authorization round, valid until `expires_at`.
#[derive(Debug, Clone)]
struct DeviceCodeSession {
    device_code: String,
    verification_url: String,
    interval: Duration,
    expires_at: Instant,
}

#[derive(Debug)]
struct AuthState {
    token: Option<OAuthToken>,
    session: Option<DeviceCodeSession>,
    status: DeviceActivationStatus,
}

enum DevicePoll {
    Authorized(OAuthToken),
    Pending,
    SlowDown,
    Denied,
    Expired,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceAuthorizeResponse {
    device_code: String,
    expires_in: u64,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    verification_uri: Option<String>,
    #[serde(default)]
    verification_uri_complete: Option<String>,
}

pub struct TadoClient {
    agent: ureq::Agent,
    store: TokenStore,
    interrupt: Interrupt,
    auth: RefCell<AuthState>,
    home_id: RefCell<Option<HomeId>>,
}

impl TadoClient {
    /// Build a client bound to the token store.
    ///
    /// A persisted refresh token is tried first; if it works the client comes
    /// up with activation already `COMPLETED`. Otherwise a fresh device
    /// authorization is started and the status is `PENDING`.
    pub fn new(store: TokenStore, interrupt: Interrupt) -> Result<Self, TadoClientError> {
        let agent = ureq::AgentBuilder::new().build();
        let client = TadoClient {
            agent,
            store,
            interrupt,
            auth: RefCell::new(AuthState {
                token: None,
                session: None,
                status: DeviceActivationStatus::NotStarted,
            }),
            home_id: RefCell::new(None),
        };

        if let Some(refresh) = client.store.load() {
            match Self::refresh_grant(&client.agent, &refresh) {
                Ok(token) => {
                    client.remember_token(token);
                    return Ok(client);
                }
                // A rejected token means re-activation; anything else (e.g.
                // network down) is reported so the caller can retry later.
                Err(TadoClientError::Auth(msg)) => {
                    warn!("Saved refresh token was rejected ({}); starting device authorization", msg);
                }
                Err(e) => return Err(e),
            }
        }

        let session = Self::device_authorize(&client.agent)?;
        {
            let mut auth = client.auth.borrow_mut();
            auth.session = Some(session);
            auth.status = DeviceActivationStatus::Pending;
        }
        Ok(client)
    }

    fn url(path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", BASE_URL, path)
        } else {
            format!("{}/{}", BASE_URL, path)
        }
    }

    fn device_authorize(agent: &ureq::Agent) -> Result<DeviceCodeSession, TadoClientError> {
        let resp = agent
            .post(DEVICE_AUTHORIZE_URL)
            .set("Accept", "application/json")
            .send_form(&[("client_id", OAUTH_CLIENT_ID), ("scope", OAUTH_SCOPE)]);
        match resp {
            Ok(r) => {
                let r: DeviceAuthorizeResponse = read_json(r)?;
                let verification_url = r
                    .verification_uri_complete
                    .or(r.verification_uri)
                    .ok_or_else(|| TadoClientError::Auth("device authorization carried no verification URI".into()))?;
                Ok(DeviceCodeSession {
                    device_code: r.device_code,
                    verification_url,
                    interval: Duration::from_secs(r.interval.unwrap_or(5)),
                    expires_at: Instant::now() + Duration::from_secs(r.expires_in),
                })
            }
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_else(|_| String::from("<no body>"));
                Err(TadoClientError::Auth(format!("device authorize http {}: {}", status, body)))
            }
            Err(ureq::Error::Transport(t)) => Err(TadoClientError::Transport(t.to_string())),
        }
    }

    fn refresh_grant(agent: &ureq::Agent, refresh: &str) -> Result<OAuthToken, TadoClientError> {
        let resp = agent
            .post(OAUTH_TOKEN_URL)
            .set("Accept", "application/json")
            .send_form(&[
                ("client_id", OAUTH_CLIENT_ID),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh),
            ]);
        match resp {
            Ok(r) => token_from_response(read_json(r)?),
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_else(|_| String::from("<no body>"));
                Err(TadoClientError::Auth(format!("http {}: {}", status, body)))
            }
            Err(ureq::Error::Transport(t)) => Err(TadoClientError::Transport(t.to_string())),
        }
    }

    fn poll_device_token(agent: &ureq::Agent, device_code: &str) -> Result<DevicePoll, TadoClientError> {
        let resp = agent
            .post(OAUTH_TOKEN_URL)
            .set("Accept", "application/json")
            .send_form(&[
                ("client_id", OAUTH_CLIENT_ID),
                ("device_code", device_code),
                ("grant_type", DEVICE_CODE_GRANT),
            ]);
        match resp {
            Ok(r) => Ok(DevicePoll::Authorized(token_from_response(read_json(r)?)?)),
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_else(|_| String::from("<no body>"));
                match oauth_error_code(&body).as_deref() {
                    Some("authorization_pending") => Ok(DevicePoll::Pending),
                    Some("slow_down") => Ok(DevicePoll::SlowDown),
                    Some("access_denied") => Ok(DevicePoll::Denied),
                    Some("expired_token") => Ok(DevicePoll::Expired),
                    _ => Err(TadoClientError::Auth(format!("http {}: {}", status, body))),
                }
            }
            Err(ureq::Error::Transport(t)) => Err(TadoClientError::Transport(t.to_string())),
        }
    }

    /// Store a fresh grant; the rotated refresh token is persisted so the
    /// next process start skips activation.
    fn remember_token(&self, token: OAuthToken) {
        if let Some(refresh) = token.refresh_token.as_deref() {
            if let Err(e) = self.store.save(refresh) {
                warn!(
                    "Persisting refresh token to {} failed: {}",
                    self.store.path().display(),
                    e
                );
            }
        }
        let mut auth = self.auth.borrow_mut();
        auth.token = Some(token);
        auth.session = None;
        auth.status = DeviceActivationStatus::Completed;
    }

    fn force_refresh(&self) -> Result<(), TadoClientError> {
        let refresh = self
            .auth
            .borrow()
            .token
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .or_else(|| self.store.load())
            .ok_or(TadoClientError::NotAuthenticated)?;
        let token = Self::refresh_grant(&self.agent, &refresh)?;
        self.remember_token(token);
        Ok(())
    }

    fn get_bearer(&self) -> Result<String, TadoClientError> {
        {
            let auth = self.auth.borrow();
            if let Some(t) = &auth.token {
                if Instant::now() + TOKEN_EXPIRY_MARGIN < t.expires_at {
                    return Ok(t.access_token.clone());
                }
            }
        }
        self.force_refresh()?;
        let auth = self.auth.borrow();
        match &auth.token {
            Some(t) => Ok(t.access_token.clone()),
            None => Err(TadoClientError::NotAuthenticated),
        }
    }

    /// One authenticated request, with a single forced refresh-and-retry on 401.
    fn execute(
        &self,
        method: &str,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ureq::Response, TadoClientError> {
        let url = Self::url(path);
        let mut retried = false;
        loop {
            let token = self.get_bearer()?;
            let req = self
                .agent
                .request(method, &url)
                .set("Accept", "application/json")
                .set("Authorization", &format!("Bearer {}", token));
            let result = match body {
                Some(v) => req.send_json(v),
                None => req.call(),
            };
            match result {
                Ok(res) => return Ok(res),
                Err(ureq::Error::Status(401, _)) if !retried => {
                    retried = true;
                    self.force_refresh()?;
                }
                Err(ureq::Error::Status(status, res)) => {
                    let message = res.into_string().unwrap_or_else(|_| String::from("<no body>"));
                    return Err(TadoClientError::Http { status, message });
                }
                Err(ureq::Error::Transport(t)) => return Err(TadoClientError::Transport(t.to_string())),
            }
        }
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TadoClientError> {
        read_json(self.execute("GET", path, None)?)
    }

    /// The single home this account manages, resolved once from `/me`.
    fn home_id(&self) -> Result<HomeId, TadoClientError> {
        if let Some(id) = *self.home_id.borrow() {
            return Ok(id);
        }
        let me: User = self.get_json("/me")?;
        let id = me
            .homes
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .find_map(|h| h.id)
            .ok_or_else(|| TadoClientError::Auth("account has no homes".into()))?;
        *self.home_id.borrow_mut() = Some(id);
        Ok(id)
    }

    fn abandon_session(&self) {
        let mut auth = self.auth.borrow_mut();
        auth.session = None;
        auth.status = DeviceActivationStatus::NotStarted;
    }

    fn put_presence(&self, presence: HomePresence) -> Result<(), TadoClientError> {
        let home = self.home_id()?;
        let body = serde_json::to_value(PresenceLock {
            home_presence: Some(presence),
        })
        .map_err(|e| TadoClientError::Json(e.to_string()))?;
        self.execute("PUT", &format!("/homes/{}/presenceLock", home.0), Some(&body))?;
        Ok(())
    }
}

impl TadoApi for TadoClient {
    fn device_activation_status(&self) -> DeviceActivationStatus {
        self.auth.borrow().status
    }

    fn device_verification_url(&self) -> Option<String> {
        self.auth
            .borrow()
            .session
            .as_ref()
            .map(|s| s.verification_url.clone())
    }

    fn device_activation(&self) -> Result<(), TadoClientError> {
        let session = self
            .auth
            .borrow()
            .session
            .clone()
            .ok_or(TadoClientError::NotAuthenticated)?;
        let mut interval = session.interval;
        loop {
            if self.interrupt.interrupted() {
                return Err(TadoClientError::Interrupted);
            }
            if Instant::now() >= session.expires_at {
                self.abandon_session();
                return Err(TadoClientError::Auth("device code expired before approval".into()));
            }
            match Self::poll_device_token(&self.agent, &session.device_code)? {
                DevicePoll::Authorized(token) => {
                    self.remember_token(token);
                    return Ok(());
                }
                DevicePoll::Pending => {}
                DevicePoll::SlowDown => interval += Duration::from_secs(5),
                DevicePoll::Denied => {
                    self.abandon_session();
                    return Err(TadoClientError::Auth("device activation was denied".into()));
                }
                DevicePoll::Expired => {
                    self.abandon_session();
                    return Err(TadoClientError::Auth("device code expired before approval".into()));
                }
            }
            if !self.interrupt.sleep(interval) {
                return Err(TadoClientError::Interrupted);
            }
        }
    }

    fn get_home_state(&self) -> Result<HomeState, TadoClientError> {
        let home = self.home_id()?;
        self.get_json(&format!("/homes/{}/state", home.0))
    }

    fn get_mobile_devices(&self) -> Result<Vec<MobileDevice>, TadoClientError> {
        let home = self.home_id()?;
        self.get_json(&format!("/homes/{}/mobileDevices", home.0))
    }

    fn set_home(&self) -> Result<(), TadoClientError> {
        self.put_presence(HomePresence::Home)
    }

    fn set_away(&self) -> Result<(), TadoClientError> {
        self.put_presence(HomePresence::Away)
    }

    fn get_zones(&self) -> Result<Vec<Zone>, TadoClientError> {
        let home = self.home_id()?;
        self.get_json(&format!("/homes/{}/zones", home.0))
    }

    fn get_zone_state(&self, zone: ZoneId) -> Result<ZoneState, TadoClientError> {
        let home = self.home_id()?;
        self.get_json(&format!("/homes/{}/zones/{}/state", home.0, zone.0))
    }

    fn get_open_window_detected(&self, zone: ZoneId) -> Result<OpenWindowDetected, TadoClientError> {
        let state = self.get_zone_state(zone)?;
        Ok(OpenWindowDetected {
            open_window_detected: Some(state.open_window_detected.unwrap_or(false)),
        })
    }

    fn set_open_window(&self, zone: ZoneId) -> Result<(), TadoClientError> {
        let home = self.home_id()?;
        self.execute(
            "POST",
            &format!("/homes/{}/zones/{}/state/openWindow/activate", home.0, zone.0),
            None,
        )?;
        Ok(())
    }

    fn set_zone_overlay(&self, zone: ZoneId, duration_secs: i64, celsius: f64) -> Result<(), TadoClientError> {
        let home = self.home_id()?;
        let body = overlay_body(duration_secs, celsius);
        self.execute("PUT", &format!("/homes/{}/zones/{}/overlay", home.0, zone.0), Some(&body))?;
        Ok(())
    }
}

fn token_from_response(r: TokenResponse) -> Result<OAuthToken, TadoClientError> {
    Ok(OAuthToken {
        access_token: r.access_token,
        expires_at: Instant::now() + Duration::from_secs(r.expires_in),
        refresh_token: r.refresh_token,
    })
}

fn read_json<T: DeserializeOwned>(res: ureq::Response) -> Result<T, TadoClientError> {
    let mut de = serde_json::Deserializer::from_reader(res.into_reader());
    serde_path_to_error::deserialize(&mut de).map_err(|e| TadoClientError::Json(e.to_string()))
}

fn oauth_error_code(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct OAuthError {
        #[serde(default)]
        error: Option<String>,
    }
    serde_json::from_str::<OAuthError>(body).ok().and_then(|e| e.error)
}

/// Overlay request body: `duration_secs == 0` yields a manual (indefinite)
/// override, anything else a timer-terminated one.
pub(crate) fn overlay_body(duration_secs: i64, celsius: f64) -> serde_json::Value {
    let termination = if duration_secs == 0 {
        serde_json::json!({ "typeSkillBasedApp": "MANUAL" })
    } else {
        serde_json::json!({ "typeSkillBasedApp": "TIMER", "durationInSeconds": duration_secs })
    };
    serde_json::json!({
        "setting": {
            "type": "HEATING",
            "power": "ON",
            "temperature": { "celsius": celsius }
        },
        "termination": termination
    })
}
