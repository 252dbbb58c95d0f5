use shared::Branch;

use crate::error::AppResult;
use crate::http::{require_data, ApiClient};

use super::require_id;

#[derive(Clone)]
pub struct BranchService {
    api: ApiClient,
}

impl BranchService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// All active branches
    pub async fn list(&self) -> AppResult<Vec<Branch>> {
        let envelope = self.api.get::<Vec<Branch>>(&["branches"]).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    pub async fn get(&self, branch_id: &str) -> AppResult<Branch> {
        let branch_id = require_id(branch_id, "Branch id")?;
        Ok(require_data(self.api.get(&["branches", branch_id]).await?)?)
    }
}
