use shared::{CheckIn, CheckInRequest, CheckOutRequest};

use crate::error::{ApiResult, AppResult};
use crate::http::{require_data, ApiClient};

use super::require_id;

#[derive(Clone)]
pub struct CheckInService {
    api: ApiClient,
}

impl CheckInService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Record a check-in. Returns the raw adapter error so the check-in flow
    /// can classify it by status.
    pub async fn create(&self, qr_code: &str, branch_id: &str) -> ApiResult<CheckIn> {
        let request = CheckInRequest {
            qr_code: qr_code.to_string(),
            branch_id: branch_id.to_string(),
        };
        require_data(self.api.post(&["checkins"], &request).await?)
    }

    /// Check-in history of the logged-in member
    pub async fn mine(&self) -> AppResult<Vec<CheckIn>> {
        let envelope = self.api.get::<Vec<CheckIn>>(&["checkins", "my-checkins"]).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    /// The open check-in, if any
    pub async fn active(&self) -> AppResult<Option<CheckIn>> {
        let envelope = self.api.get::<CheckIn>(&["checkins", "active"]).await?;
        Ok(envelope.data)
    }

    pub async fn checkout(&self, check_in_id: &str, notes: Option<String>) -> AppResult<CheckIn> {
        let check_in_id = require_id(check_in_id, "Check-in id")?;
        let request = CheckOutRequest { notes };
        Ok(require_data(
            self.api.put(&["checkins", check_in_id, "checkout"], &request).await?,
        )?)
    }
}
