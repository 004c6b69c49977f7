use crate::config::GovernedTags;
use crate::model::{ReferenceFeature, SourceRecord, TagChange, Tags};

/// Canonical `(key, value)` pairs the governed tags must hold for `record`.
pub fn governed_values(record: &SourceRecord, governed: &GovernedTags) -> Vec<(String, String)> {
    let mut values = vec![
        (governed.population.clone(), record.population.to_string()),
        (governed.date.clone(), record.record_date.format("%Y-%m-%d").to_string()),
    ];
    if let Some(source) = &governed.source {
        values.push((source.key.clone(), source.value.clone()));
    }
    values
}

/// Bring the governed tags of `tags` in line with `record`.
///
/// Returns the change made per governed key, in governed-key order.
pub fn apply_governed(tags: &mut Tags, record: &SourceRecord, governed: &GovernedTags) -> Vec<TagChange> {
    governed_values(record, governed)
        .iter()
        .map(|(key, value)| tags.set(key, value))
        .collect()
}

/// Reconcile one matched pair. Returns true when at least one tag was added
/// or changed; only then is the feature marked modified.
pub fn reconcile_feature(
    record: &SourceRecord,
    feature: &mut ReferenceFeature,
    governed: &GovernedTags,
) -> bool {
    let changed = apply_governed(&mut feature.tags, record, governed)
        .into_iter()
        .any(TagChange::is_change);
    if changed {
        feature.modified = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceTag;
    use crate::id::{EntityId, EntityKind};
    use crate::model::{ElementRef, ElementType, Population};
    use chrono::NaiveDate;

    fn record(population: &str) -> SourceRecord {
        SourceRecord {
            id: EntityId::parse(EntityKind::Settlement, "4522").unwrap(),
            name: "Stavanger/Sandnes".into(),
            population: population.parse().unwrap(),
            record_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            parent_refs: vec![],
        }
    }

    fn feature(tags: &[(&str, &str)]) -> ReferenceFeature {
        ReferenceFeature::new(
            EntityId::parse(EntityKind::Settlement, "4522").unwrap(),
            ElementRef { element_type: ElementType::Node, id: 42 },
            tags.iter().copied().collect(),
        )
    }

    fn with_source() -> GovernedTags {
        GovernedTags {
            source: Some(SourceTag {
                key: "source:population".into(),
                value: "SSB".into(),
            }),
            ..GovernedTags::default()
        }
    }

    #[test]
    fn adds_missing_tags() {
        let mut f = feature(&[("name", "Stavanger")]);
        assert!(reconcile_feature(&record("222000"), &mut f, &GovernedTags::default()));
        assert!(f.modified);
        assert_eq!(f.tags.get("population"), Some("222000"));
        assert_eq!(f.tags.get("population:date"), Some("2020-01-01"));
        assert_eq!(f.tags.get("name"), Some("Stavanger"));
    }

    #[test]
    fn updates_changed_value_in_place() {
        let mut f = feature(&[("population", "1"), ("name", "X"), ("population:date", "2019-01-01")]);
        assert!(reconcile_feature(&record("5"), &mut f, &GovernedTags::default()));
        let keys: Vec<&str> = f.tags.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["population", "name", "population:date"]);
        assert_eq!(f.tags.get("population"), Some("5"));
    }

    #[test]
    fn second_run_is_noop() {
        let governed = with_source();
        let mut f = feature(&[("name", "Stavanger"), ("population", "100")]);
        assert!(reconcile_feature(&record("222000"), &mut f, &governed));

        let before = f.tags.clone();
        f.modified = false;
        assert!(!reconcile_feature(&record("222000"), &mut f, &governed));
        assert!(!f.modified);
        assert_eq!(f.tags, before);
    }

    #[test]
    fn grouped_source_value_equals_plain_attribute() {
        let mut f = feature(&[("population", "12345"), ("population:date", "2020-01-01")]);
        assert!(!reconcile_feature(&record("12 345"), &mut f, &GovernedTags::default()));
        assert!(!f.modified);
    }

    #[test]
    fn formatted_attribute_is_rewritten_canonical() {
        let mut f = feature(&[("population", "12 345"), ("population:date", "2020-01-01")]);
        assert!(reconcile_feature(&record("12345"), &mut f, &GovernedTags::default()));
        assert_eq!(f.tags.get("population"), Some("12345"));
    }

    #[test]
    fn date_change_alone_marks_modified() {
        let mut f = feature(&[("population", "7"), ("population:date", "2019-01-01")]);
        assert!(reconcile_feature(&record("7"), &mut f, &GovernedTags::default()));
        assert_eq!(f.tags.get("population:date"), Some("2020-01-01"));
    }

    #[test]
    fn change_list_per_key() {
        let mut tags: Tags = [("population", "7")].into_iter().collect();
        let changes = apply_governed(&mut tags, &record("7"), &with_source());
        assert_eq!(changes, vec![TagChange::Unchanged, TagChange::Added, TagChange::Added]);
        assert_eq!(Population(7).to_string(), "7");
    }
}
