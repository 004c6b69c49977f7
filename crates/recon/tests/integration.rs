use chrono::NaiveDate;

use popsync_recon::config::ReconConfig;
use popsync_recon::create::Placement;
use popsync_recon::engine::{prepare_source, run_level};
use popsync_recon::model::{ElementRef, ElementType, MemberRef, Population, ReferenceFeature, SourceRecord, SourceSet, Tags};
use popsync_recon::{EntityId, EntityKind, ReconError, RunReport, Warning};

const MUNICIPALITIES: &str = r#"
name = "Municipalities"

[[levels]]
kind = "municipality"
key = "ref"
"#;

const SETTLEMENTS: &str = r#"
name = "Urban settlements"

[tags]
source = { key = "source:population", value = "SSB - befolkning i tettstedet" }

[[levels]]
kind = "settlement"
key = "ref:ssb_tettsted"
create_missing = true

[splits."0022"]
"3004" = "part"
"3003" = "part"

[splits."4522"]
"1103" = "all"
"1108" = "part"

[splits."9999"]
"0101" = "part"
"#;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

fn id(kind: EntityKind, code: &str) -> EntityId {
    EntityId::parse(kind, code).unwrap()
}

fn source(kind: EntityKind, code: &str, population: &str, members: Vec<MemberRef>) -> SourceRecord {
    SourceRecord {
        id: id(kind, code),
        name: format!("Place {code}"),
        population: population.parse().unwrap(),
        record_date: date(),
        parent_refs: members,
    }
}

fn feature(kind: EntityKind, code: &str, osm_id: i64, tags: &[(&str, &str)]) -> ReferenceFeature {
    ReferenceFeature::new(
        id(kind, code),
        ElementRef { element_type: ElementType::Node, id: osm_id },
        tags.iter().copied().collect::<Tags>(),
    )
}

fn member(code: &str, population: u64) -> MemberRef {
    MemberRef { id: code.into(), name: format!("Municipality {code}"), population: Population(population) }
}

fn never_locate(_: &SourceRecord) -> Result<Placement, ReconError> {
    panic!("no creation expected")
}

// -------------------------------------------------------------------------
// Administrative level
// -------------------------------------------------------------------------

#[test]
fn end_to_end_scenario() {
    // A updated 400 -> 500, B only in source, C only in reference.
    let config = ReconConfig::from_toml(MUNICIPALITIES).unwrap();
    let level = &config.levels[0];
    let m = EntityKind::Municipality;
    let mut report = RunReport::new();

    let records = SourceSet::from_records(vec![
        source(m, "1001", "500", vec![]),
        source(m, "1002", "300", vec![]),
    ])
    .unwrap();
    let records = prepare_source(&config, level, records, &mut report).unwrap();
    let mut features = vec![
        feature(m, "1001", 1, &[("population", "400")]),
        feature(m, "1003", 3, &[("population", "1")]),
    ];

    let outcome = run_level(level, &config.tags, &records, &mut features, &mut report, never_locate).unwrap();

    assert_eq!(features[0].tags.get("population"), Some("500"));
    assert!(features[0].modified);
    assert!(!features[1].modified);
    assert_eq!(features[1].tags.get("population"), Some("1"));
    assert_eq!(outcome.matches.unmatched_source, vec![id(m, "1002")]);
    assert!(outcome.matches.unmatched_reference.contains_key(&id(m, "1003")));

    let s = report.level(m).unwrap();
    assert_eq!(s.updated, 1);
    assert_eq!(s.created, 0);
    assert_eq!(s.stale, 1);
    assert_eq!(s.missing, 1);
    assert_eq!(s.already_correct, 0);

    assert!(report.warnings.contains(&Warning::NotInSource { id: id(m, "1003") }));
    assert!(report.warnings.contains(&Warning::NotInReference {
        id: id(m, "1002"),
        name: "Place 1002".into(),
    }));
}

#[test]
fn reconciliation_is_idempotent() {
    let config = ReconConfig::from_toml(MUNICIPALITIES).unwrap();
    let level = &config.levels[0];
    let m = EntityKind::Municipality;
    let records = SourceSet::from_records(vec![source(m, "0301", "697 010", vec![])]).unwrap();
    let mut features = vec![feature(m, "0301", 1, &[("name", "Oslo"), ("population", "693494")])];

    let mut first = RunReport::new();
    run_level(level, &config.tags, &records, &mut features, &mut first, never_locate).unwrap();
    assert_eq!(first.level(m).unwrap().updated, 1);
    let after_first = features[0].tags.clone();

    features[0].modified = false;
    let mut second = RunReport::new();
    run_level(level, &config.tags, &records, &mut features, &mut second, never_locate).unwrap();

    assert!(!features[0].modified);
    assert_eq!(features[0].tags, after_first);
    let s = second.level(m).unwrap();
    assert_eq!((s.updated, s.already_correct), (0, 1));
}

#[test]
fn modified_counter_is_exact() {
    let config = ReconConfig::from_toml(MUNICIPALITIES).unwrap();
    let level = &config.levels[0];
    let m = EntityKind::Municipality;
    let records = SourceSet::from_records(
        (1..=6).map(|i| source(m, &format!("{:04}", i), &format!("{}", i * 10), vec![])),
    )
    .unwrap();
    let mut features = vec![
        // both tags wrong
        feature(m, "0001", 1, &[("population", "1"), ("population:date", "2019-01-01")]),
        // only date missing
        feature(m, "0002", 2, &[("population", "20")]),
        // already correct
        feature(m, "0003", 3, &[("population", "30"), ("population:date", "2020-01-01")]),
        // nothing at all
        feature(m, "0004", 4, &[]),
    ];
    let mut report = RunReport::new();

    run_level(level, &config.tags, &records, &mut features, &mut report, never_locate).unwrap();

    let flagged = features.iter().filter(|f| f.modified).count();
    let s = report.level(m).unwrap();
    assert_eq!(flagged, 3);
    assert_eq!(s.updated, flagged);
    assert_eq!(s.already_correct, 1);
    assert_eq!(s.missing, 2);
}

// -------------------------------------------------------------------------
// Settlement level
// -------------------------------------------------------------------------

#[test]
fn settlement_splits_then_matches() {
    let config = ReconConfig::from_toml(SETTLEMENTS).unwrap();
    let level = config.level(EntityKind::Settlement).unwrap();
    let s = EntityKind::Settlement;
    let mut report = RunReport::new();

    let records = SourceSet::from_records(vec![
        source(s, "0022", "100", vec![member("3004", 60), member("3003", 40)]),
        source(s, "4522", "250", vec![member("1103", 200), member("1108", 50)]),
        source(s, "0100", "80", vec![member("0101", 80)]),
    ])
    .unwrap();
    let records = prepare_source(&config, level, records, &mut report).unwrap();

    let ids: Vec<String> = records.ids().map(|i| i.to_string()).collect();
    assert_eq!(ids, vec!["0022-3003", "0022-3004", "0100", "4522", "4522-1108"]);
    assert!(report
        .warnings
        .contains(&Warning::SplitCompositeMissing { id: id(s, "9999") }));

    let mut features = vec![
        feature(s, "0022-3004", 10, &[("population", "55")]),
        feature(s, "4522", 11, &[
            ("population", "250"),
            ("population:date", "2020-01-01"),
            ("source:population", "SSB - befolkning i tettstedet"),
        ]),
        feature(s, "0022", 12, &[("population", "100")]),
    ];

    let outcome = run_level(level, &config.tags, &records, &mut features, &mut report, |_| {
        Ok::<_, ReconError>(Placement::not_found())
    })
    .unwrap();

    let summary = report.level(s).unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.already_correct, 1);
    // The old composite 0022 no longer exists in source data.
    assert_eq!(summary.stale, 1);
    assert_eq!(summary.created, 3);
    assert_eq!(summary.needs_check, 3);
    assert_eq!(summary.missing, 0);

    let created: Vec<String> = outcome.created.iter().map(|f| f.id.to_string()).collect();
    assert_eq!(created, vec!["0022-3003", "0100", "4522-1108"]);
    let new_part = &outcome.created[0];
    assert_eq!(new_part.tags.get("ref:ssb_tettsted"), Some("0022-3003"));
    assert_eq!(new_part.tags.get("population"), Some("40"));
    assert_eq!(new_part.tags.get("source:population"), Some("SSB - befolkning i tettstedet"));
}

#[test]
fn duplicate_settlement_refs_abort() {
    let config = ReconConfig::from_toml(SETTLEMENTS).unwrap();
    let level = config.level(EntityKind::Settlement).unwrap();
    let s = EntityKind::Settlement;
    let records = SourceSet::from_records(vec![source(s, "0100", "80", vec![])]).unwrap();
    let mut features = vec![
        feature(s, "0100", 1, &[("population", "1")]),
        feature(s, "0100", 2, &[("population", "2")]),
    ];
    let mut report = RunReport::new();

    let err = run_level(level, &config.tags, &records, &mut features, &mut report, never_locate)
        .unwrap_err();

    assert_eq!(err, ReconError::DuplicateReference(vec![id(s, "0100")]));
    assert!(features.iter().all(|f| !f.modified));
    assert_eq!(features[0].tags.get("population"), Some("1"));
}
