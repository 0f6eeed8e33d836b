use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, params};

/// Why a player is out. Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityStatus {
    Injured,
    Suspended,
    Doubtful,
}

impl AvailabilityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AvailabilityStatus::Injured => "injured",
            AvailabilityStatus::Suspended => "suspended",
            AvailabilityStatus::Doubtful => "doubtful",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "injured" => Ok(AvailabilityStatus::Injured),
            "suspended" => Ok(AvailabilityStatus::Suspended),
            "doubtful" => Ok(AvailabilityStatus::Doubtful),
            other => Err(anyhow!("unknown availability status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerAvailability {
    pub id: i64,
    pub player_name: String,
    pub team: String,
    pub status: AvailabilityStatus,
    pub reason: Option<String>,
    /// YYYY-MM-DD; the player is out from this day inclusive.
    pub start_date: String,
    /// YYYY-MM-DD; the player is still out on this day. None = open-ended.
    pub expected_return_date: Option<String>,
    /// 1..=5, how much the absence hurts.
    pub impact_level: u8,
    pub is_key_player: bool,
}

#[derive(Debug, Clone)]
pub struct NewPlayerAvailability {
    pub player_name: String,
    pub team: String,
    pub status: AvailabilityStatus,
    pub reason: Option<String>,
    pub start_date: String,
    pub expected_return_date: Option<String>,
    pub impact_level: u8,
    pub is_key_player: bool,
}

/// Missing key players for one team on one date. A zero count is the normal
/// fully-available answer, not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissingReport {
    pub count: usize,
    pub players: Vec<String>,
    pub total_impact: i64,
}

pub fn add_player_availability(conn: &Connection, record: &NewPlayerAvailability) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO player_availability
            (player_name, team, status, reason, start_date, expected_return_date,
             impact_level, is_key_player)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            record.player_name,
            record.team,
            record.status.as_str(),
            record.reason,
            record.start_date,
            record.expected_return_date,
            i64::from(record.impact_level.clamp(1, 5)),
            record.is_key_player as i64,
        ],
    )
    .context("insert player availability")?;
    Ok(conn.last_insert_rowid())
}

pub fn set_expected_return(conn: &Connection, id: i64, date: Option<&str>) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE player_availability SET expected_return_date = ?1 WHERE id = ?2",
            params![date, id],
        )
        .context("update expected return date")?;
    if changed == 0 {
        return Err(anyhow!("no availability record with id {id}"));
    }
    Ok(())
}

/// Key players out on `date`: the interval test is closed on both ends, so a
/// player whose expected return equals `date` is still counted out.
pub fn key_players_missing(conn: &Connection, team: &str, date: &str) -> Result<MissingReport> {
    let rows = query_unavailable(conn, team, date, true)?;
    let total_impact = rows.iter().map(|r| i64::from(r.impact_level)).sum();
    Ok(MissingReport {
        count: rows.len(),
        players: rows.into_iter().map(|r| r.player_name).collect(),
        total_impact,
    })
}

/// Every unavailable player regardless of key-player status.
pub fn unavailable_players(
    conn: &Connection,
    team: &str,
    date: &str,
) -> Result<Vec<PlayerAvailability>> {
    query_unavailable(conn, team, date, false)
}

fn query_unavailable(
    conn: &Connection,
    team: &str,
    date: &str,
    key_only: bool,
) -> Result<Vec<PlayerAvailability>> {
    let sql = format!(
        r#"
        SELECT id, player_name, team, status, reason, start_date,
               expected_return_date, impact_level, is_key_player
        FROM player_availability
        WHERE team = ?1
          AND start_date <= ?2
          AND (expected_return_date IS NULL OR expected_return_date >= ?2)
          {}
        ORDER BY impact_level DESC, player_name ASC
        "#,
        if key_only { "AND is_key_player = 1" } else { "" }
    );

    let mut stmt = conn.prepare(&sql).context("prepare availability query")?;
    let rows = stmt
        .query_map(params![team, date], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, i64>(8)?,
            ))
        })
        .context("query unavailable players")?;

    let mut out = Vec::new();
    for row in rows {
        let (id, player_name, team, status, reason, start_date, expected_return_date, impact, key) =
            row.context("decode availability row")?;
        out.push(PlayerAvailability {
            id,
            player_name,
            team,
            status: AvailabilityStatus::parse(&status)?,
            reason,
            start_date,
            expected_return_date,
            impact_level: impact.clamp(1, 5) as u8,
            is_key_player: key != 0,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store;

    fn mem_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        store::init_schema(&conn).expect("init schema");
        conn
    }

    fn out_record(
        name: &str,
        status: AvailabilityStatus,
        start: &str,
        ret: Option<&str>,
        key: bool,
    ) -> NewPlayerAvailability {
        NewPlayerAvailability {
            player_name: name.to_string(),
            team: "Marseille".to_string(),
            status,
            reason: None,
            start_date: start.to_string(),
            expected_return_date: ret.map(|d| d.to_string()),
            impact_level: 4,
            is_key_player: key,
        }
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            AvailabilityStatus::Injured,
            AvailabilityStatus::Suspended,
            AvailabilityStatus::Doubtful,
        ] {
            assert_eq!(AvailabilityStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(AvailabilityStatus::parse("fit").is_err());
    }

    #[test]
    fn interval_is_closed_on_both_ends() {
        let conn = mem_db();
        add_player_availability(
            &conn,
            &out_record(
                "Martin",
                AvailabilityStatus::Injured,
                "2025-04-10",
                Some("2025-04-10"),
                true,
            ),
        )
        .expect("insert");

        // Out exactly on the single-day interval, back the day after.
        let on_day = key_players_missing(&conn, "Marseille", "2025-04-10").expect("query");
        assert_eq!(on_day.count, 1);
        assert_eq!(on_day.players, vec!["Martin".to_string()]);
        assert_eq!(on_day.total_impact, 4);

        let day_after = key_players_missing(&conn, "Marseille", "2025-04-11").expect("query");
        assert_eq!(day_after, MissingReport::default());

        let day_before = key_players_missing(&conn, "Marseille", "2025-04-09").expect("query");
        assert_eq!(day_before.count, 0);
    }

    #[test]
    fn suspension_window_scenario() {
        let conn = mem_db();
        add_player_availability(
            &conn,
            &out_record(
                "Durand",
                AvailabilityStatus::Suspended,
                "2025-04-12",
                Some("2025-04-19"),
                true,
            ),
        )
        .expect("insert");

        let mid = key_players_missing(&conn, "Marseille", "2025-04-15").expect("query");
        assert_eq!(mid.count, 1);
        let after = key_players_missing(&conn, "Marseille", "2025-04-20").expect("query");
        assert_eq!(after.count, 0);
    }

    #[test]
    fn open_ended_absence_never_expires() {
        let conn = mem_db();
        add_player_availability(
            &conn,
            &out_record("Petit", AvailabilityStatus::Injured, "2025-01-01", None, true),
        )
        .expect("insert");

        let much_later = key_players_missing(&conn, "Marseille", "2025-12-31").expect("query");
        assert_eq!(much_later.count, 1);
    }

    #[test]
    fn general_variant_includes_non_key_players() {
        let conn = mem_db();
        add_player_availability(
            &conn,
            &out_record("Roux", AvailabilityStatus::Doubtful, "2025-04-01", None, false),
        )
        .expect("insert");
        add_player_availability(
            &conn,
            &out_record("Blanc", AvailabilityStatus::Injured, "2025-04-01", None, true),
        )
        .expect("insert");

        let key_only = key_players_missing(&conn, "Marseille", "2025-04-02").expect("query");
        assert_eq!(key_only.players, vec!["Blanc".to_string()]);

        let all = unavailable_players(&conn, "Marseille", "2025-04-02").expect("query");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn return_date_update_reinstates_player() {
        let conn = mem_db();
        let id = add_player_availability(
            &conn,
            &out_record("Morel", AvailabilityStatus::Injured, "2025-04-01", None, true),
        )
        .expect("insert");

        set_expected_return(&conn, id, Some("2025-04-05")).expect("update");
        let after = key_players_missing(&conn, "Marseille", "2025-04-06").expect("query");
        assert_eq!(after.count, 0);

        assert!(set_expected_return(&conn, 9999, None).is_err());
    }
}
