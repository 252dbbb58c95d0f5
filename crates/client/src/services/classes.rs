use chrono::NaiveDate;
use serde::Serialize;
use shared::{
    AttendanceUpdate, Class, ClassStatus, ClassStatusUpdate, Reservation, ReservationStatus,
    TrainerClass,
};

use crate::error::{ApiError, AppResult};
use crate::http::{require_data, ApiClient};

use super::require_id;

/// Filters for the available-classes listing
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableClassesQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct DateQuery {
    date: NaiveDate,
}

/// Outcome a trainer can record for a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceMark {
    Completed,
    NoShow,
}

impl From<AttendanceMark> for ReservationStatus {
    fn from(mark: AttendanceMark) -> Self {
        match mark {
            AttendanceMark::Completed => ReservationStatus::Completed,
            AttendanceMark::NoShow => ReservationStatus::NoShow,
        }
    }
}

fn check_consistent(classes: &[Class]) -> AppResult<()> {
    if let Some(bad) = classes.iter().find(|c| !c.is_consistent()) {
        tracing::warn!(
            class_id = %bad.id,
            capacity = bad.capacity,
            attendees = bad.current_attendees,
            "Class has more attendees than capacity"
        );
        return Err(ApiError::unexpected_response(None).into());
    }
    Ok(())
}

#[derive(Clone)]
pub struct ClassService {
    api: ApiClient,
}

impl ClassService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn available(&self, query: &AvailableClassesQuery) -> AppResult<Vec<Class>> {
        let envelope = self
            .api
            .get_with_query::<Vec<Class>, _>(&["classes", "available"], query)
            .await?;
        let classes = envelope.data.unwrap_or_default();
        check_consistent(&classes)?;
        Ok(classes)
    }

    /// Classes the logged-in member has reserved
    pub async fn my_classes(&self) -> AppResult<Vec<Class>> {
        let envelope = self.api.get::<Vec<Class>>(&["classes", "my-classes"]).await?;
        let classes = envelope.data.unwrap_or_default();
        check_consistent(&classes)?;
        Ok(classes)
    }

    pub async fn get(&self, class_id: &str) -> AppResult<Class> {
        let class_id = require_id(class_id, "Class id")?;
        let class: Class = require_data(self.api.get(&["classes", class_id]).await?)?;
        check_consistent(std::slice::from_ref(&class))?;
        Ok(class)
    }

    pub async fn reserve(&self, class_id: &str) -> AppResult<()> {
        let class_id = require_id(class_id, "Class id")?;
        self.api
            .post_empty::<serde_json::Value>(&["classes", class_id, "reserve"])
            .await?;
        tracing::info!(class_id = %class_id, "Class reserved");
        Ok(())
    }

    pub async fn cancel(&self, class_id: &str) -> AppResult<()> {
        let class_id = require_id(class_id, "Class id")?;
        self.api
            .delete::<serde_json::Value>(&["classes", class_id, "reserve"])
            .await?;
        tracing::info!(class_id = %class_id, "Reservation cancelled");
        Ok(())
    }

    /// Classes assigned to the logged-in trainer, optionally for one day
    pub async fn trainer_classes(&self, date: Option<NaiveDate>) -> AppResult<Vec<TrainerClass>> {
        let envelope = match date {
            Some(date) => {
                self.api
                    .get_with_query::<Vec<TrainerClass>, _>(&["classes", "trainer"], &DateQuery { date })
                    .await?
            }
            None => self.api.get::<Vec<TrainerClass>>(&["classes", "trainer"]).await?,
        };
        Ok(envelope.data.unwrap_or_default())
    }

    pub async fn update_status(&self, class_id: &str, status: ClassStatus) -> AppResult<()> {
        let class_id = require_id(class_id, "Class id")?;
        self.api
            .put::<serde_json::Value, _>(&["classes", class_id], &ClassStatusUpdate { status })
            .await?;
        tracing::info!(class_id = %class_id, status = ?status, "Class status updated");
        Ok(())
    }

    /// Record whether a member attended a reserved class
    pub async fn mark_attendance(
        &self,
        reservation_id: &str,
        mark: AttendanceMark,
    ) -> AppResult<Option<Reservation>> {
        let reservation_id = require_id(reservation_id, "Reservation id")?;
        let update = AttendanceUpdate { status: mark.into() };
        let envelope = self
            .api
            .put::<Reservation, _>(&["classes", "reservations", reservation_id], &update)
            .await?;
        Ok(envelope.data)
    }
}
