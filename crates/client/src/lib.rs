//! Client library for the GymMaster backend: session lifecycle with an
//! optional second factor, typed resource services and the QR check-in flow.

use std::sync::Arc;

pub mod auth;
pub mod cache;
pub mod checkin;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod http;
pub mod services;
pub mod session;
pub mod storage;

pub use auth::{AuthService, LoginOutcome};
pub use checkin::{AttemptOutcome, CheckInAttempt, CheckInFlow, ScanResult};
pub use config::ClientConfig;
pub use error::{ApiError, AppError, AppResult, CheckInError, ErrorKind, Notice};
pub use http::ApiClient;
pub use session::{Phase, SessionState, SessionStore};
pub use storage::{FileStorage, MemoryStorage, SessionStorage};

use dashboard::MemberDashboard;
use services::{BranchService, CheckInService, ClassService, MemberService};

/// The application context: one adapter and one session, built at startup
/// and handed to whatever needs them.
#[derive(Clone)]
pub struct GymClient {
    api: ApiClient,
}

impl GymClient {
    /// Build the client and restore any persisted session
    pub fn new(config: &ClientConfig, storage: Arc<dyn SessionStorage>) -> AppResult<Self> {
        let session = Arc::new(SessionStore::new(storage));
        session.restore_session();
        let api = ApiClient::new(config, session)?;
        tracing::debug!(base_url = %api.base_url(), phase = ?api.session().phase(), "Client ready");
        Ok(Self { api })
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        self.api.session()
    }

    pub fn auth(&self) -> AuthService {
        AuthService::new(self.api.clone())
    }

    pub fn classes(&self) -> ClassService {
        ClassService::new(self.api.clone())
    }

    pub fn members(&self) -> MemberService {
        MemberService::new(self.api.clone())
    }

    pub fn branches(&self) -> BranchService {
        BranchService::new(self.api.clone())
    }

    pub fn checkins(&self) -> CheckInService {
        CheckInService::new(self.api.clone())
    }

    pub fn check_in_flow(&self) -> CheckInFlow {
        CheckInFlow::new(self.session().clone(), self.checkins())
    }

    pub async fn member_dashboard(&self) -> MemberDashboard {
        dashboard::load_member_dashboard(&self.classes(), &self.members()).await
    }
}
