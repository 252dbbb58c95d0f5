//! Dashboard loading for members and trainers.

use chrono::{DateTime, NaiveDate, Utc};
use shared::{Class, MemberStats, TrainerClass};

use crate::error::AppResult;
use crate::services::{AvailableClassesQuery, ClassService, MemberService};

/// Member home screen data. Each half is loaded independently, so one failing
/// never hides the other.
#[derive(Debug)]
pub struct MemberDashboard {
    pub classes: AppResult<Vec<Class>>,
    pub stats: AppResult<MemberStats>,
}

impl MemberDashboard {
    pub fn upcoming(&self, now: DateTime<Utc>) -> usize {
        self.classes
            .as_ref()
            .map(|classes| classes.iter().filter(|c| c.start_time > now).count())
            .unwrap_or(0)
    }
}

pub async fn load_member_dashboard(classes: &ClassService, members: &MemberService) -> MemberDashboard {
    let query = AvailableClassesQuery::default();
    let (classes, stats) = tokio::join!(classes.available(&query), members.my_stats());

    if let Err(e) = &classes {
        tracing::warn!("Dashboard classes failed: {}", e);
    }
    if let Err(e) = &stats {
        tracing::warn!("Dashboard stats failed: {}", e);
    }
    MemberDashboard { classes, stats }
}

#[derive(Debug)]
pub struct TrainerDashboard {
    pub classes: Vec<TrainerClass>,
    pub upcoming: usize,
    pub completed_today: usize,
}

impl TrainerDashboard {
    pub fn summarize(classes: Vec<TrainerClass>, now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let upcoming = classes.iter().filter(|c| c.class.start_time > now).count();
        let completed_today = classes
            .iter()
            .filter(|c| c.class.start_time.date_naive() == today && c.class.start_time < now)
            .count();
        Self {
            classes,
            upcoming,
            completed_today,
        }
    }
}

pub async fn load_trainer_dashboard(classes: &ClassService, date: Option<NaiveDate>) -> AppResult<TrainerDashboard> {
    let list = classes.trainer_classes(date).await?;
    Ok(TrainerDashboard::summarize(list, Utc::now()))
}
