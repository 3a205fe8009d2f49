use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Backend, StorageConfig};
use crate::lifecycle::NewReport;
use crate::models::{assign_missing_ids, Report, Status};

/// The single slot the report sequence is persisted in.
///
/// Every save replaces the whole payload. There is no locking, so two
/// processes writing the same slot overwrite each other.
#[derive(Debug, Clone)]
pub enum Store {
    File { path: PathBuf },
    Postgres { pool: PgPool, slot: String },
}

impl Store {
    pub async fn connect(config: &StorageConfig) -> anyhow::Result<Self> {
        match config.backend {
            Backend::File => Ok(Self::file(
                config.data_dir.join(format!("{}.json", config.slot)),
            )),
            Backend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("storage.database_url or DATABASE_URL must be set for the postgres backend")?;
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(url)
                    .await
                    .context("failed to connect to Postgres")?;
                Ok(Store::Postgres {
                    pool,
                    slot: config.slot.clone(),
                })
            }
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Store::File { path: path.into() }
    }

    pub fn describe(&self) -> String {
        match self {
            Store::File { path } => path.display().to_string(),
            Store::Postgres { slot, .. } => format!("postgres slot {slot}"),
        }
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        match self {
            Store::File { path } => {
                if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(dir)
                        .await
                        .with_context(|| format!("failed to create {}", dir.display()))?;
                }
            }
            Store::Postgres { pool, .. } => {
                sqlx::migrate!("./migrations").run(pool).await?;
            }
        }
        Ok(())
    }

    /// Never fails: a missing slot or unreadable payload yields no reports.
    pub async fn load(&self) -> Vec<Report> {
        match self.read_raw().await {
            Ok(raw) => {
                let reports = decode_reports(raw.as_deref());
                debug!(count = reports.len(), slot = %self.describe(), "loaded reports");
                reports
            }
            Err(err) => {
                warn!(slot = %self.describe(), "could not read report slot: {err:#}");
                Vec::new()
            }
        }
    }

    pub async fn save(&self, reports: &[Report]) -> anyhow::Result<()> {
        let payload = encode_reports(reports)?;
        match self {
            Store::File { path } => write_file_slot(path, &payload).await?,
            Store::Postgres { pool, slot } => {
                sqlx::query(
                    r#"
                    INSERT INTO health_watch.slots (name, payload, updated_at)
                    VALUES ($1, $2, now())
                    ON CONFLICT (name) DO UPDATE
                    SET payload = EXCLUDED.payload, updated_at = EXCLUDED.updated_at
                    "#,
                )
                .bind(slot)
                .bind(&payload)
                .execute(pool)
                .await
                .context("failed to write report slot")?;
            }
        }
        debug!(count = reports.len(), slot = %self.describe(), "saved reports");
        Ok(())
    }

    async fn read_raw(&self) -> anyhow::Result<Option<String>> {
        match self {
            Store::File { path } => match tokio::fs::read_to_string(path).await {
                Ok(raw) => Ok(Some(raw)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
            },
            Store::Postgres { pool, slot } => {
                let row = sqlx::query("SELECT payload FROM health_watch.slots WHERE name = $1")
                    .bind(slot)
                    .fetch_optional(pool)
                    .await?;
                Ok(row.map(|row| row.get::<String, _>("payload")))
            }
        }
    }
}

async fn write_file_slot(path: &Path, payload: &str) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, payload)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

pub fn decode_reports(raw: Option<&str>) -> Vec<Report> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<Report>>(raw) {
        Ok(mut reports) => {
            let assigned = assign_missing_ids(&mut reports);
            if assigned > 0 {
                debug!(assigned, "derived ids for reports stored without one");
            }
            reports
        }
        Err(err) => {
            warn!("discarding unreadable report payload: {err}");
            Vec::new()
        }
    }
}

pub fn encode_reports(reports: &[Report]) -> anyhow::Result<String> {
    serde_json::to_string(reports).context("failed to serialize reports")
}

/// Appends a handful of demo reports. Reports already present (by id) are skipped.
pub async fn seed(store: &Store) -> anyhow::Result<usize> {
    let samples = [
        (
            "6f1c2d3e-4a5b-4c6d-8e7f-901a2b3c4d5e",
            "Amina Yusuf",
            "Kibera",
            vec!["diarrhea"],
            "contaminated",
            "Several children ill after the borehole flooded",
            4,
            Status::Processing,
        ),
        (
            "1b2c3d4e-5f60-4718-9a2b-3c4d5e6f7a8b",
            "Joseph Otieno",
            "Kibera",
            vec!["fever", "vomiting"],
            "poor",
            "",
            3,
            Status::NotSolved,
        ),
        (
            "9a8b7c6d-5e4f-4321-8fed-cba987654321",
            "Grace Wanjiru",
            "Nyeri",
            vec!["rash"],
            "good",
            "Resolved after clinic visit",
            1,
            Status::Solved,
        ),
    ];

    let mut reports = store.load().await;
    let base_time = chrono::Utc::now().timestamp_millis();
    let mut inserted = 0usize;

    for (offset, (id, name, village, symptoms, water, comments, count, status)) in
        samples.into_iter().enumerate()
    {
        let id = Uuid::parse_str(id)?;
        if reports.iter().any(|r| r.id == id) {
            continue;
        }
        reports.push(Report {
            id,
            name: name.to_string(),
            village: village.to_string(),
            symptom: symptoms.into_iter().map(String::from).collect(),
            water_quality: water.to_string(),
            comments: comments.to_string(),
            count,
            time: base_time + offset as i64,
            status,
        });
        inserted += 1;
    }

    if inserted > 0 {
        store.save(&reports).await?;
    }
    Ok(inserted)
}

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(default)]
    name: String,
    village: String,
    symptoms: String,
    water_quality: String,
    #[serde(default)]
    comments: String,
    count: Option<u32>,
    time: Option<i64>,
    status: Option<String>,
}

pub async fn import_csv(store: &Store, csv_path: &Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut reports = store.load().await;
    let now = chrono::Utc::now().timestamp_millis();
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(err) => {
                warn!(row = line + 1, "skipping unreadable CSV row: {err}");
                continue;
            }
        };
        let form = NewReport {
            name: row.name,
            village: row.village,
            symptoms: row.symptoms.split(';').map(String::from).collect(),
            water_quality: row.water_quality,
            comments: row.comments,
            count: row.count,
        };

        let mut report = match form.into_report(row.time.unwrap_or(now)) {
            Ok(report) => report,
            Err(err) => {
                warn!(row = line + 1, "skipping CSV row: {err}");
                continue;
            }
        };

        if let Some(raw) = row.status {
            report.status = Status::from(Some(raw.trim().to_string()));
        }

        reports.push(report);
        inserted += 1;
    }

    if inserted > 0 {
        store.save(&reports).await?;
    }
    info!(inserted, path = %csv_path.display(), "imported reports");
    Ok(inserted)
}

pub fn export_csv(reports: &[Report], csv_path: &Path) -> anyhow::Result<usize> {
    let mut writer = csv::Writer::from_path(csv_path)
        .with_context(|| format!("failed to create {}", csv_path.display()))?;

    for report in reports {
        writer.serialize(CsvRow {
            name: report.name.clone(),
            village: report.village.clone(),
            symptoms: report.symptom.join(";"),
            water_quality: report.water_quality.clone(),
            comments: report.comments.clone(),
            count: Some(report.count),
            time: Some(report.time),
            status: Some(report.status.to_string()),
        })?;
    }

    writer.flush()?;
    Ok(reports.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report(village: &str, status: Status) -> Report {
        Report {
            id: Uuid::new_v4(),
            name: "Amina".to_string(),
            village: village.to_string(),
            symptom: vec!["fever".to_string(), "rash".to_string()],
            water_quality: "poor".to_string(),
            comments: "near the river".to_string(),
            count: 2,
            time: 1_700_000_000_000,
            status,
        }
    }

    #[tokio::test]
    async fn missing_slot_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::file(dir.path().join("health_reports.json"));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_preserves_order_and_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::file(dir.path().join("nested").join("health_reports.json"));
        let reports = vec![
            sample_report("Alpha", Status::Processing),
            sample_report("Beta", Status::Unrecognized("escalated".to_string())),
            sample_report("Gamma", Status::Solved),
        ];

        store.save(&reports).await.unwrap();
        assert_eq!(store.load().await, reports);
    }

    #[tokio::test]
    async fn save_replaces_previous_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::file(dir.path().join("health_reports.json"));

        store
            .save(&[sample_report("Alpha", Status::Processing)])
            .await
            .unwrap();
        let replacement = vec![sample_report("Beta", Status::NotSolved)];
        store.save(&replacement).await.unwrap();

        assert_eq!(store.load().await, replacement);
    }

    #[tokio::test]
    async fn corrupt_slot_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health_reports.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = Store::file(&path);
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn legacy_reports_keep_their_id_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health_reports.json");
        std::fs::write(
            &path,
            r#"[{"village":"Alpha","symptom":["fever"],"waterQuality":"poor","time":1700000000000,"status":"processing"}]"#,
        )
        .unwrap();
        let store = Store::file(&path);

        let shown = store.load().await[0].id;
        assert_eq!(store.load().await[0].id, shown);

        let change = crate::lifecycle::change_status(
            &store,
            crate::lifecycle::Target::Id(shown),
            Status::Solved,
        )
        .await
        .unwrap();
        assert_eq!(change.id, shown);

        let reports = store.load().await;
        assert_eq!(reports[0].id, shown);
        assert_eq!(reports[0].status, Status::Solved);
    }

    #[tokio::test]
    async fn null_fields_do_not_discard_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health_reports.json");
        std::fs::write(
            &path,
            r#"[{"name":null,"village":"Alpha","symptom":["fever"],"waterQuality":"poor","comments":null,"time":1},
                {"name":"Grace","village":"Beta","symptom":["rash"],"waterQuality":null,"time":2}]"#,
        )
        .unwrap();

        let reports = Store::file(&path).load().await;
        assert_eq!(reports.len(), 2);
        assert!(reports[0].name.is_empty());
        assert!(reports[1].water_quality.is_empty());
    }

    #[test]
    fn decode_handles_blank_and_legacy_payloads() {
        assert!(decode_reports(None).is_empty());
        assert!(decode_reports(Some("  ")).is_empty());
        assert!(decode_reports(Some("null")).is_empty());

        let legacy = r#"[{"name":"","village":"Alpha","symptom":["fever"],"waterQuality":"poor","comments":"","count":1,"time":1700000000000,"status":"processing"}]"#;
        let reports = decode_reports(Some(legacy));
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].village, "Alpha");
    }

    #[tokio::test]
    async fn seed_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::file(dir.path().join("health_reports.json"));

        assert_eq!(seed(&store).await.unwrap(), 3);
        assert_eq!(seed(&store).await.unwrap(), 0);
        assert_eq!(store.load().await.len(), 3);
    }

    #[tokio::test]
    async fn import_skips_invalid_rows() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("reports.csv");
        std::fs::write(
            &csv_path,
            "name,village,symptoms,water_quality,comments,count,time,status\n\
             Amina,Alpha,fever;rash,poor,,3,1700000000000,not_solved\n\
             Joseph,,fever,poor,,1,,\n\
             Grace,Beta,,good,,1,,\n\
             Otieno,Gamma,cough,none,,,,\n\
             Kamau,Epsilon,fever,poor,,abc,,\n\
             Njeri,Zeta\n\
             Wanjiru,Delta,cough,good,,2,,\n",
        )
        .unwrap();

        let store = Store::file(dir.path().join("health_reports.json"));
        let inserted = import_csv(&store, &csv_path).await.unwrap();
        assert_eq!(inserted, 3);

        let reports = store.load().await;
        assert_eq!(reports[0].village, "Alpha");
        assert_eq!(reports[0].symptom, vec!["fever", "rash"]);
        assert_eq!(reports[0].count, 3);
        assert_eq!(reports[0].status, Status::NotSolved);
        assert_eq!(reports[1].village, "Gamma");
        assert_eq!(reports[1].count, 1);
        assert_eq!(reports[1].status, Status::Processing);
        assert_eq!(reports[2].village, "Delta");
        assert_eq!(reports[2].count, 2);
    }

    #[tokio::test]
    async fn export_then_import_keeps_reports() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("out.csv");
        let reports = vec![
            sample_report("Alpha", Status::Solved),
            sample_report("Beta", Status::Processing),
            sample_report("Gamma", Status::Unrecognized("escalated".to_string())),
        ];

        assert_eq!(export_csv(&reports, &csv_path).unwrap(), 3);

        let store = Store::file(dir.path().join("health_reports.json"));
        assert_eq!(import_csv(&store, &csv_path).await.unwrap(), 3);
        let imported = store.load().await;
        assert_eq!(imported[0].status, Status::Solved);
        assert_eq!(imported[1].village, "Beta");
        assert_eq!(imported[1].time, 1_700_000_000_000);
        assert_eq!(
            imported[2].status,
            Status::Unrecognized("escalated".to_string())
        );
    }
}
