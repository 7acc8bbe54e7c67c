use crate::models::job::JobType;

/// Statements for one queue table, fixed at compile time.
pub struct QueueSql {
    pub counts: &'static str,
    pub count_total: &'static str,
    pub count_waiting: &'static str,
    pub count_unfinished: &'static str,
    pub in_flight_workers: &'static str,
    pub reset_all: &'static str,
    pub kick: &'static str,
    pub truncate: &'static str,
    pub insert_ids: &'static str,
    pub claim_next: &'static str,
    pub mark_finished: &'static str,
    pub get_job: &'static str,
}

macro_rules! queue_sql {
    ($table:literal) => {
        QueueSql {
            counts: concat!(
                "SELECT count(*) AS total, ",
                "count(*) FILTER (WHERE started IS NULL) AS waiting, ",
                "count(*) FILTER (WHERE started IS NOT NULL AND finished IS NULL) AS claimed, ",
                "count(*) FILTER (WHERE finished IS NOT NULL) AS done ",
                "FROM ", $table
            ),
            count_total: concat!("SELECT count(*) FROM ", $table),
            count_waiting: concat!("SELECT count(*) FROM ", $table, " WHERE started IS NULL"),
            count_unfinished: concat!("SELECT count(*) FROM ", $table, " WHERE finished IS NULL"),
            in_flight_workers: concat!(
                "SELECT DISTINCT dyno FROM ", $table,
                " WHERE started IS NOT NULL AND finished IS NULL AND dyno IS NOT NULL ORDER BY dyno"
            ),
            reset_all: concat!("UPDATE ", $table, " SET started = NULL, finished = NULL, dyno = NULL"),
            // Rows are re-checked at update time, so a row finished concurrently is left alone.
            kick: concat!(
                "UPDATE ", $table,
                " SET started = NULL, dyno = NULL WHERE started IS NOT NULL AND finished IS NULL"
            ),
            truncate: concat!("TRUNCATE TABLE ", $table),
            insert_ids: concat!("INSERT INTO ", $table, " (id) SELECT lower(u) FROM UNNEST($1::text[]) AS u"),
            claim_next: concat!(
                "UPDATE ", $table, " SET started = now(), dyno = $1 ",
                "WHERE id = (SELECT id FROM ", $table,
                " WHERE started IS NULL ORDER BY rand LIMIT 1 FOR UPDATE SKIP LOCKED) ",
                "AND started IS NULL RETURNING id"
            ),
            mark_finished: concat!(
                "UPDATE ", $table, " SET finished = now(), started = COALESCE(started, now()) ",
                "WHERE id = $1 AND finished IS NULL"
            ),
            get_job: concat!("SELECT id, rand, started, finished, dyno FROM ", $table, " WHERE id = $1"),
        }
    };
}

const NORMAL: QueueSql = queue_sql!("job_queue");
const HYBRID: QueueSql = queue_sql!("job_queue_with_hybrid");
const DATES: QueueSql = queue_sql!("job_queue_dates");

/// Resolve a job type to its table's statements.
pub fn for_job_type(job_type: JobType) -> &'static QueueSql {
    match job_type {
        JobType::Normal => &NORMAL,
        JobType::Hybrid => &HYBRID,
        JobType::Dates => &DATES,
    }
}
