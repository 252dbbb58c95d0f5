use shared::{MemberProfile, MemberStats, ProfileUpdate};

use crate::error::{AppError, AppResult};
use crate::http::{require_data, ApiClient};

#[derive(Clone)]
pub struct MemberService {
    api: ApiClient,
}

impl MemberService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn my_stats(&self) -> AppResult<MemberStats> {
        Ok(require_data(self.api.get(&["members", "my-stats"]).await?)?)
    }

    pub async fn profile(&self) -> AppResult<MemberProfile> {
        Ok(require_data(self.api.get(&["members", "profile"]).await?)?)
    }

    /// Send the fields set in `update`; returns the stored profile
    pub async fn update_profile(&self, update: &ProfileUpdate) -> AppResult<MemberProfile> {
        if update.is_empty() {
            return Err(AppError::Validation("Nothing to update".to_string()));
        }
        Ok(require_data(self.api.put(&["members", "profile"], update).await?)?)
    }
}
