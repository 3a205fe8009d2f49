//! Report submission and status changes.
//!
//! Each mutation is a whole-sequence read-modify-write against the [`Store`].

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::{InvalidStatus, Report, Status};
use crate::store::Store;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Please fill all required fields (missing {0}).")]
    MissingField(&'static str),

    #[error(transparent)]
    InvalidStatus(#[from] InvalidStatus),

    #[error("no report at position {index}; there are {len} reports")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("no report with id {0}")]
    UnknownReport(Uuid),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl LifecycleError {
    /// User mistakes that leave the data untouched and should not fail the process.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, LifecycleError::Store(_))
    }
}

/// Input collected from the submission form.
#[derive(Debug, Clone, Default)]
pub struct NewReport {
    pub name: String,
    pub village: String,
    pub symptoms: Vec<String>,
    pub water_quality: String,
    pub comments: String,
    pub count: Option<u32>,
}

impl NewReport {
    pub fn into_report(self, now_ms: i64) -> Result<Report, LifecycleError> {
        let village = self.village.trim().to_string();
        let symptoms: Vec<String> = self
            .symptoms
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        let water_quality = self.water_quality.trim().to_string();

        if village.is_empty() {
            return Err(LifecycleError::MissingField("village"));
        }
        if symptoms.is_empty() {
            return Err(LifecycleError::MissingField("symptoms"));
        }
        if water_quality.is_empty() {
            return Err(LifecycleError::MissingField("water quality"));
        }

        Ok(Report {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            village,
            symptom: symptoms,
            water_quality,
            comments: self.comments.trim().to_string(),
            count: self.count.filter(|n| *n > 0).unwrap_or(1),
            time: now_ms,
            status: Status::Processing,
        })
    }
}

/// Which report a status change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Id(Uuid),
    /// Position in the newest-first listing.
    DisplayIndex(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub id: Uuid,
    pub village: String,
    pub previous: Status,
    pub current: Status,
}

/// Storage index of the report `target` refers to.
pub fn resolve(reports: &[Report], target: Target) -> Result<usize, LifecycleError> {
    match target {
        Target::Id(id) => reports
            .iter()
            .position(|r| r.id == id)
            .ok_or(LifecycleError::UnknownReport(id)),
        Target::DisplayIndex(index) if index < reports.len() => Ok(reports.len() - 1 - index),
        Target::DisplayIndex(index) => Err(LifecycleError::IndexOutOfRange {
            index,
            len: reports.len(),
        }),
    }
}

/// Validates prompt input. `None` means the prompt was cancelled.
pub fn parse_status_input(input: Option<&str>) -> Result<Option<Status>, InvalidStatus> {
    match input {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some),
    }
}

/// Turns a raw prompt line into status input. `None` (EOF) cancels, and an
/// empty line takes the prompt's default, the current status, when that is
/// one the user could have typed; otherwise it cancels too.
pub fn prompt_answer(line: Option<&str>, current: &Status) -> Option<String> {
    let line = line?.trim_end_matches(['\r', '\n']);
    if !line.is_empty() {
        return Some(line.to_string());
    }
    match current {
        Status::Unrecognized(_) => None,
        known => Some(known.to_string()),
    }
}

pub fn apply_status(
    reports: &mut [Report],
    target: Target,
    status: Status,
) -> Result<StatusChange, LifecycleError> {
    let index = resolve(reports, target)?;
    let report = &mut reports[index];
    let previous = std::mem::replace(&mut report.status, status);

    Ok(StatusChange {
        id: report.id,
        village: report.village.clone(),
        previous,
        current: report.status.clone(),
    })
}

pub async fn submit_report(store: &Store, form: NewReport) -> Result<Report, LifecycleError> {
    let report = form.into_report(chrono::Utc::now().timestamp_millis())?;

    let mut reports = store.load().await;
    reports.push(report.clone());
    store.save(&reports).await?;

    info!(id = %report.id, village = %report.village, "report submitted");
    Ok(report)
}

pub async fn change_status(
    store: &Store,
    target: Target,
    status: Status,
) -> Result<StatusChange, LifecycleError> {
    let mut reports = store.load().await;
    let change = apply_status(&mut reports, target, status)?;
    store.save(&reports).await?;

    info!(
        id = %change.id,
        from = %change.previous,
        to = %change.current,
        "status updated"
    );
    Ok(change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{Dashboard, NO_ALERTS};

    fn form(village: &str, symptoms: &[&str], water: &str) -> NewReport {
        NewReport {
            name: "  Amina ".to_string(),
            village: village.to_string(),
            symptoms: symptoms.iter().map(|s| s.to_string()).collect(),
            water_quality: water.to_string(),
            comments: String::new(),
            count: None,
        }
    }

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::file(dir.path().join("health_reports.json"));
        (dir, store)
    }

    #[test]
    fn submission_requires_village_symptom_and_water() {
        assert!(matches!(
            form("  ", &["fever"], "poor").into_report(0),
            Err(LifecycleError::MissingField("village"))
        ));
        assert!(matches!(
            form("Alpha", &[" "], "poor").into_report(0),
            Err(LifecycleError::MissingField("symptoms"))
        ));
        assert!(matches!(
            form("Alpha", &["fever"], "").into_report(0),
            Err(LifecycleError::MissingField("water quality"))
        ));
    }

    #[test]
    fn new_reports_start_processing() {
        let report = form(" Alpha ", &["fever"], "poor").into_report(42).unwrap();
        assert_eq!(report.status, Status::Processing);
        assert_eq!(report.village, "Alpha");
        assert_eq!(report.name, "Amina");
        assert_eq!(report.count, 1);
        assert_eq!(report.time, 42);
    }

    #[test]
    fn display_index_maps_to_storage_index() {
        let reports: Vec<Report> = ["Old", "Middle", "New"]
            .iter()
            .map(|v| form(v, &["rash"], "good").into_report(0).unwrap())
            .collect();

        assert_eq!(resolve(&reports, Target::DisplayIndex(0)).unwrap(), 2);
        assert_eq!(resolve(&reports, Target::DisplayIndex(2)).unwrap(), 0);
        assert!(matches!(
            resolve(&reports, Target::DisplayIndex(3)),
            Err(LifecycleError::IndexOutOfRange { index: 3, len: 3 })
        ));
        assert_eq!(resolve(&reports, Target::Id(reports[1].id)).unwrap(), 1);
    }

    #[test]
    fn prompt_input_validation() {
        assert_eq!(parse_status_input(None), Ok(None));
        assert_eq!(parse_status_input(Some("solved\n")), Ok(Some(Status::Solved)));
        assert!(parse_status_input(Some("")).is_err());
        assert!(parse_status_input(Some("closed")).is_err());
    }

    #[test]
    fn empty_prompt_line_keeps_known_status_and_cancels_unknown() {
        assert_eq!(prompt_answer(None, &Status::Processing), None);
        assert_eq!(
            prompt_answer(Some("\n"), &Status::NotSolved).as_deref(),
            Some("not_solved")
        );
        assert_eq!(
            prompt_answer(Some("\n"), &Status::Unrecognized("escalated".into())),
            None
        );
        assert_eq!(
            prompt_answer(Some("solved\r\n"), &Status::Unrecognized("escalated".into()))
                .as_deref(),
            Some("solved")
        );
    }

    #[tokio::test]
    async fn rejected_submission_stores_nothing() {
        let (_dir, store) = temp_store();
        let err = submit_report(&store, form("", &["fever"], "poor"))
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn out_of_range_change_leaves_store_untouched() {
        let (_dir, store) = temp_store();
        submit_report(&store, form("Alpha", &["fever"], "poor"))
            .await
            .unwrap();
        let before = store.load().await;

        let err = change_status(&store, Target::DisplayIndex(1), Status::Solved)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::IndexOutOfRange { .. }));
        assert_eq!(store.load().await, before);

        let err = change_status(&store, Target::Id(Uuid::new_v4()), Status::Solved)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::UnknownReport(_)));
        assert_eq!(store.load().await, before);
    }

    #[tokio::test]
    async fn submit_then_solve_updates_dashboard() {
        let (_dir, store) = temp_store();
        let report = submit_report(&store, form("Alpha", &["fever"], "poor"))
            .await
            .unwrap();

        let dashboard = Dashboard::from_reports(&store.load().await);
        assert_eq!(dashboard.kpis.total_reports, 1);
        assert_eq!(dashboard.kpis.active_cases, 1);
        assert_eq!(dashboard.kpis.response_rate, 0);
        assert_eq!(
            dashboard.alert_lines(),
            vec!["High fever cases reported in Alpha - Status: processing".to_string()]
        );

        let change = change_status(&store, Target::Id(report.id), Status::Solved)
            .await
            .unwrap();
        assert_eq!(change.previous, Status::Processing);
        assert_eq!(change.current, Status::Solved);

        let dashboard = Dashboard::from_reports(&store.load().await);
        assert_eq!(dashboard.kpis.response_rate, 100);
        assert_eq!(dashboard.kpis.active_cases, 0);
        assert_eq!(dashboard.alert_lines(), vec![NO_ALERTS.to_string()]);
    }

    #[tokio::test]
    async fn newest_report_is_display_index_zero() {
        let (_dir, store) = temp_store();
        submit_report(&store, form("Old", &["rash"], "good"))
            .await
            .unwrap();
        submit_report(&store, form("New", &["rash"], "good"))
            .await
            .unwrap();

        let change = change_status(&store, Target::DisplayIndex(0), Status::NotSolved)
            .await
            .unwrap();
        assert_eq!(change.village, "New");

        let reports = store.load().await;
        assert_eq!(reports[0].status, Status::Processing);
        assert_eq!(reports[1].status, Status::NotSolved);
    }
}
