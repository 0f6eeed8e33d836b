use rusqlite::Connection;

use matchform::head_to_head::{self, H2hOutcome};
use matchform::store::{self, NewMatch};

fn mem_db() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    store::init_schema(&conn).expect("init schema");
    conn
}

fn played(date: &str, home: &str, away: &str, hs: i32, aw: i32) -> NewMatch {
    NewMatch {
        date: date.to_string(),
        home_team: home.to_string(),
        away_team: away.to_string(),
        home_score: Some(hs),
        away_score: Some(aw),
        round: None,
        season: 2025,
        stadium: None,
    }
}

const CUTOFF: &str = "2025-06-01T00:00:00Z";

#[test]
fn teams_that_never_met_produce_nothing() {
    let conn = mem_db();
    store::insert_match(&conn, &played("2025-03-01T20:00:00Z", "Lyon", "Nice", 1, 0))
        .expect("insert");

    let record =
        head_to_head::compute_head_to_head(&conn, "Lyon", "Marseille", CUTOFF).expect("compute");
    assert!(record.is_none());

    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM head_to_head_stats", [], |row| row.get(0))
        .expect("count");
    assert_eq!(rows, 0);
}

#[test]
fn swapped_arguments_are_mirror_consistent() {
    let conn = mem_db();
    store::insert_match(&conn, &played("2025-01-10T20:00:00Z", "Lyon", "Nice", 2, 0))
        .expect("insert");
    store::insert_match(&conn, &played("2025-02-10T20:00:00Z", "Nice", "Lyon", 1, 1))
        .expect("insert");
    store::insert_match(&conn, &played("2025-03-10T20:00:00Z", "Nice", "Lyon", 3, 1))
        .expect("insert");

    let from_lyon = head_to_head::compute_head_to_head(&conn, "Lyon", "Nice", CUTOFF)
        .expect("compute")
        .expect("record");
    let from_nice = head_to_head::compute_head_to_head(&conn, "Nice", "Lyon", CUTOFF)
        .expect("compute")
        .expect("record");

    assert_eq!(from_lyon.team_a_wins, from_nice.team_b_wins);
    assert_eq!(from_lyon.team_b_wins, from_nice.team_a_wins);
    assert_eq!(from_lyon.draws, from_nice.draws);
    assert!((from_lyon.team_a_goals_avg - from_nice.team_b_goals_avg).abs() < 1e-12);
    assert!((from_lyon.team_b_goals_avg - from_nice.team_a_goals_avg).abs() < 1e-12);
    assert_eq!(from_lyon.clone().mirrored(), from_nice);

    // Most recent first: Nice won 3-1, then the draw, then Lyon's 2-0.
    assert_eq!(
        from_lyon.last_5,
        vec![H2hOutcome::Loss, H2hOutcome::Draw, H2hOutcome::Win]
    );

    // Both orientations share a single stored row for the unordered pair.
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM head_to_head_stats", [], |row| row.get(0))
        .expect("count");
    assert_eq!(rows, 1);
}

#[test]
fn only_the_five_most_recent_meetings_count() {
    let conn = mem_db();
    // Seven meetings; Brest wins the two oldest, which must fall out.
    store::insert_match(&conn, &played("2024-09-01T20:00:00Z", "Brest", "Metz", 4, 0))
        .expect("insert");
    store::insert_match(&conn, &played("2024-10-01T20:00:00Z", "Metz", "Brest", 0, 1))
        .expect("insert");
    for month in 1..=5 {
        let date = format!("2025-{month:02}-01T20:00:00Z");
        store::insert_match(&conn, &played(&date, "Metz", "Brest", 2, 0)).expect("insert");
    }

    let record = head_to_head::compute_head_to_head(&conn, "Brest", "Metz", CUTOFF)
        .expect("compute")
        .expect("record");
    assert_eq!(record.total_matches(), 5);
    assert_eq!(record.team_a_wins, 0);
    assert_eq!(record.team_b_wins, 5);
    assert!((record.team_a_goals_avg - 0.0).abs() < 1e-12);
    assert!((record.team_b_goals_avg - 2.0).abs() < 1e-12);
}

#[test]
fn cutoff_excludes_later_meetings() {
    let conn = mem_db();
    store::insert_match(&conn, &played("2025-01-10T20:00:00Z", "Lens", "Lille", 1, 0))
        .expect("insert");
    store::insert_match(&conn, &played("2025-05-10T20:00:00Z", "Lille", "Lens", 5, 0))
        .expect("insert");

    let record =
        head_to_head::compute_head_to_head(&conn, "Lens", "Lille", "2025-02-01T00:00:00Z")
            .expect("compute")
            .expect("record");
    assert_eq!(record.total_matches(), 1);
    assert_eq!(record.team_a_wins, 1);
}

#[test]
fn refresh_recomputes_every_pair_in_one_pass() {
    let mut conn = mem_db();
    store::insert_match(&conn, &played("2025-01-10T20:00:00Z", "Lyon", "Nice", 2, 1))
        .expect("insert");
    store::insert_match(&conn, &played("2025-02-10T20:00:00Z", "Lyon", "Marseille", 0, 0))
        .expect("insert");

    let summary = head_to_head::refresh_head_to_head(&mut conn, CUTOFF).expect("refresh");
    // Three teams, three pairs, but Nice and Marseille never met.
    assert_eq!(summary.pairs_considered, 3);
    assert_eq!(summary.records_written, 2);

    // A rerun is a full replace, not an accumulation.
    let again = head_to_head::refresh_head_to_head(&mut conn, CUTOFF).expect("refresh");
    assert_eq!(again.records_written, 2);
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM head_to_head_stats", [], |row| row.get(0))
        .expect("count");
    assert_eq!(rows, 2);
}
