// OSM XML documents
//
// Only what a reviewer needs to open the result in an editor survives a
// round trip: the root attributes, node/way/relation elements with their
// attributes, and their nd/member/tag children. Anything else at the root
// (<note>, <meta>, <bounds>) is dropped on read.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use popsync_recon::config::LevelConfig;
use popsync_recon::create::NewFeature;
use popsync_recon::model::{ElementRef, ElementType, ReferenceFeature, Tags};
use popsync_recon::{EntityId, RunReport, Warning};

use crate::error::IoError;

/// Id of the first node added by [`Document::add_nodes`]. Later ones count down.
pub const FIRST_NEW_NODE_ID: i64 = -1001;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Attributes of the `<osm>` root, in document order.
    pub attributes: Vec<(String, String)>,
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub element_type: ElementType,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Child>,
}

/// An `<nd>`, `<member>` or `<tag>` child.
#[derive(Debug, Clone, PartialEq)]
pub struct Child {
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

impl Child {
    fn attribute(&self, key: &str) -> Option<&str> {
        lookup(&self.attributes, key)
    }

    fn tag(key: &str, value: &str) -> Self {
        Self {
            name: "tag".into(),
            attributes: vec![("k".into(), key.into()), ("v".into(), value.into())],
        }
    }
}

fn lookup<'a>(attributes: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn set(attributes: &mut Vec<(String, String)>, key: &str, value: &str) {
    match attributes.iter_mut().find(|(k, _)| k == key) {
        Some((_, v)) => *v = value.to_string(),
        None => attributes.push((key.to_string(), value.to_string())),
    }
}

fn xml_err(e: impl std::fmt::Display) -> IoError {
    IoError::Xml(e.to_string())
}

fn element_type(name: &[u8]) -> Option<ElementType> {
    match name {
        b"node" => Some(ElementType::Node),
        b"way" => Some(ElementType::Way),
        b"relation" => Some(ElementType::Relation),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Element
// ---------------------------------------------------------------------------

impl Element {
    pub fn new(element_type: ElementType, id: i64) -> Self {
        Self {
            element_type,
            attributes: vec![("id".into(), id.to_string())],
            children: Vec::new(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        lookup(&self.attributes, key)
    }

    pub fn set_attribute(&mut self, key: &str, value: &str) {
        set(&mut self.attributes, key, value);
    }

    pub fn id(&self) -> Option<i64> {
        self.attribute("id")?.parse().ok()
    }

    pub fn element_ref(&self) -> Option<ElementRef> {
        Some(ElementRef {
            element_type: self.element_type,
            id: self.id()?,
        })
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.children
            .iter()
            .filter(|c| c.name == "tag")
            .find(|c| c.attribute("k") == Some(key))
            .and_then(|c| c.attribute("v"))
    }

    pub fn tags(&self) -> Tags {
        self.children
            .iter()
            .filter(|c| c.name == "tag")
            .filter_map(|c| Some((c.attribute("k")?, c.attribute("v")?)))
            .collect()
    }

    /// Replace all tag children. Other children keep their order and come first.
    pub fn set_tags(&mut self, tags: &Tags) {
        self.children.retain(|c| c.name != "tag");
        self.children.extend(tags.iter().map(|(k, v)| Child::tag(k, v)));
    }

    pub fn is_modified(&self) -> bool {
        self.attribute("action") == Some("modify")
    }

    pub fn mark_modified(&mut self) {
        self.set_attribute("action", "modify");
    }

    /// Same position and same nd/member children; tags may differ.
    fn same_shape(&self, other: &Element) -> bool {
        let shape = |e: &Element| {
            (
                e.attribute("lat").map(str::to_owned),
                e.attribute("lon").map(str::to_owned),
                e.children.iter().filter(|c| c.name != "tag").cloned().collect::<Vec<_>>(),
            )
        };
        self.element_type == other.element_type && shape(self) == shape(other)
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

impl Document {
    pub fn parse(xml: &str) -> Result<Self, IoError> {
        Parser::default().run(xml)
    }

    pub fn read(path: &Path) -> Result<Self, IoError> {
        let xml = std::fs::read_to_string(path).map_err(|e| IoError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&xml)
    }

    /// Features of `level` in this document.
    ///
    /// Elements whose key tag is not a valid identifier are skipped with a
    /// warning. On the country level every selected element is the country.
    pub fn features(&self, level: &LevelConfig, report: &mut RunReport) -> Vec<ReferenceFeature> {
        let mut features = Vec::new();

        for element in &self.elements {
            if !level.selects(|k| element.tag(k)) {
                continue;
            }
            let Some(element_ref) = element.element_ref() else {
                log::debug!("skipping {} without a numeric id", element.element_type);
                continue;
            };

            let id = match level.key.as_deref() {
                None => EntityId::country(),
                Some(key) => {
                    let value = element.tag(key).unwrap_or_default();
                    match EntityId::parse(level.kind, value) {
                        Ok(id) => id,
                        Err(_) => {
                            report.warn(Warning::MalformedReferenceKey {
                                kind: level.kind,
                                element: element_ref.to_string(),
                                value: value.to_string(),
                            });
                            continue;
                        }
                    }
                }
            };

            features.push(ReferenceFeature::new(id, element_ref, element.tags()));
        }

        features
    }

    /// Write the tags of modified features back and flag their elements.
    /// Returns the number of elements changed.
    pub fn apply(&mut self, features: &[ReferenceFeature]) -> usize {
        let index: HashMap<ElementRef, usize> = self
            .elements
            .iter()
            .enumerate()
            .filter_map(|(i, e)| Some((e.element_ref()?, i)))
            .collect();

        let mut applied = 0;
        for feature in features.iter().filter(|f| f.modified) {
            let Some(&i) = index.get(&feature.element) else {
                log::warn!("{} for {} is not in the document", feature.element, feature.id);
                continue;
            };
            let element = &mut self.elements[i];
            element.set_tags(&feature.tags);
            element.mark_modified();
            applied += 1;
        }
        applied
    }

    /// Highest id below every id in the document, and never above
    /// [`FIRST_NEW_NODE_ID`].
    pub fn first_free_id(&self) -> i64 {
        self.elements
            .iter()
            .filter_map(Element::id)
            .fold(FIRST_NEW_NODE_ID, |low, id| low.min(id.saturating_sub(1)))
    }

    /// Append new features as nodes, numbering them downwards from `*next_id`
    /// or from below the lowest id already in the document.
    pub fn add_nodes(&mut self, created: &[NewFeature], next_id: &mut i64) {
        *next_id = (*next_id).min(self.first_free_id());
        for feature in created {
            let mut node = Element::new(ElementType::Node, *next_id);
            *next_id -= 1;
            node.mark_modified();
            node.set_attribute("lat", &feature.placement.lat.to_string());
            node.set_attribute("lon", &feature.placement.lon.to_string());
            node.set_tags(&feature.tags);
            self.elements.push(node);
        }
    }

    /// Append the elements of `other`. An element already present is kept
    /// unless only the incoming copy is modified. A new (negative id) element
    /// colliding with a different one is renumbered, never dropped.
    pub fn merge(&mut self, other: Document) {
        if self.attributes.is_empty() {
            self.attributes = other.attributes;
        }

        let mut index: HashMap<ElementRef, usize> = self
            .elements
            .iter()
            .enumerate()
            .filter_map(|(i, e)| Some((e.element_ref()?, i)))
            .collect();

        for mut element in other.elements {
            let Some(element_ref) = element.element_ref() else {
                self.elements.push(element);
                continue;
            };
            match index.get(&element_ref) {
                Some(&i) if element_ref.id < 0 && !self.elements[i].same_shape(&element) => {
                    let id = self.first_free_id();
                    log::warn!("{element_ref} is already used by another new element, renumbered to {id}");
                    element.set_attribute("id", &id.to_string());
                    index.insert(ElementRef { id, ..element_ref }, self.elements.len());
                    self.elements.push(element);
                }
                Some(&i) => {
                    if element.is_modified() && !self.elements[i].is_modified() {
                        self.elements[i] = element;
                    }
                }
                None => {
                    index.insert(element_ref, self.elements.len());
                    self.elements.push(element);
                }
            }
        }
    }

    pub fn modified_count(&self) -> usize {
        self.elements.iter().filter(|e| e.is_modified()).count()
    }

    /// Serialize with `generator` and `upload="false"` on the root.
    pub fn write_to<W: Write>(&self, generator: &str, out: W) -> Result<(), IoError> {
        let mut attributes = self.attributes.clone();
        if lookup(&attributes, "version").is_none() {
            attributes.insert(0, ("version".into(), "0.6".into()));
        }
        set(&mut attributes, "generator", generator);
        set(&mut attributes, "upload", "false");

        let mut writer = Writer::new_with_indent(out, b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_err)?;

        let mut root = BytesStart::new("osm");
        for (k, v) in &attributes {
            root.push_attribute((k.as_str(), v.as_str()));
        }
        writer.write_event(Event::Start(root)).map_err(xml_err)?;

        for element in &self.elements {
            let name = element.element_type.as_str();
            let mut start = BytesStart::new(name);
            for (k, v) in &element.attributes {
                start.push_attribute((k.as_str(), v.as_str()));
            }
            if element.children.is_empty() {
                writer.write_event(Event::Empty(start)).map_err(xml_err)?;
                continue;
            }
            writer.write_event(Event::Start(start)).map_err(xml_err)?;
            for child in &element.children {
                let mut tag = BytesStart::new(child.name.as_str());
                for (k, v) in &child.attributes {
                    tag.push_attribute((k.as_str(), v.as_str()));
                }
                writer.write_event(Event::Empty(tag)).map_err(xml_err)?;
            }
            writer.write_event(Event::End(BytesEnd::new(name))).map_err(xml_err)?;
        }

        writer.write_event(Event::End(BytesEnd::new("osm"))).map_err(xml_err)?;
        writer.into_inner().flush().map_err(xml_err)?;
        Ok(())
    }

    pub fn to_xml(&self, generator: &str) -> Result<String, IoError> {
        let mut buf = Vec::new();
        self.write_to(generator, &mut buf)?;
        String::from_utf8(buf).map_err(xml_err)
    }

    /// Write to a temporary file beside `path` and rename it into place, so
    /// a failed run never leaves a half-written document behind.
    pub fn save(&self, generator: &str, path: &Path) -> Result<(), IoError> {
        let write_err = |e: std::io::Error| IoError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output.osm".into());
        let tmp = path.with_file_name(format!(".{file_name}.tmp"));

        let result = File::create(&tmp)
            .map_err(write_err)
            .and_then(|file| self.write_to(generator, BufWriter::new(file)))
            .and_then(|()| std::fs::rename(&tmp, path).map_err(write_err));

        if result.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Parser {
    doc: Document,
    current: Option<Element>,
    saw_root: bool,
}

impl Parser {
    fn run(mut self, xml: &str) -> Result<Document, IoError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut depth = 0usize;
        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    depth += 1;
                    self.open(e, depth, false)?;
                }
                Ok(Event::Empty(ref e)) => self.open(e, depth + 1, true)?,
                Ok(Event::End(_)) => {
                    if depth == 2 {
                        if let Some(element) = self.current.take() {
                            self.doc.elements.push(element);
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(IoError::Xml(format!(
                        "at position {}: {e}",
                        reader.buffer_position()
                    )))
                }
                _ => {}
            }
        }

        if !self.saw_root {
            return Err(IoError::Structure("no <osm> root element".into()));
        }
        Ok(self.doc)
    }

    fn open(&mut self, e: &BytesStart, depth: usize, empty: bool) -> Result<(), IoError> {
        let name = e.name();
        match depth {
            1 => {
                if name.as_ref() != b"osm" {
                    return Err(IoError::Structure(format!(
                        "root element is <{}>, expected <osm>",
                        String::from_utf8_lossy(name.as_ref())
                    )));
                }
                self.saw_root = true;
                self.doc.attributes = attributes(e)?;
            }
            2 => match element_type(name.as_ref()) {
                Some(element_type) => {
                    let element = Element {
                        element_type,
                        attributes: attributes(e)?,
                        children: Vec::new(),
                    };
                    if empty {
                        self.doc.elements.push(element);
                    } else {
                        self.current = Some(element);
                    }
                }
                None => log::trace!("ignoring <{}>", String::from_utf8_lossy(name.as_ref())),
            },
            3 => {
                if let Some(current) = self.current.as_mut() {
                    current.children.push(Child {
                        name: String::from_utf8_lossy(name.as_ref()).into_owned(),
                        attributes: attributes(e)?,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn attributes(e: &BytesStart) -> Result<Vec<(String, String)>, IoError> {
    e.attributes()
        .map(|attr| {
            let attr = attr.map_err(xml_err)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(xml_err)?
                .into_owned();
            Ok((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use popsync_recon::create::Placement;
    use popsync_recon::model::{Population, SourceRecord};
    use popsync_recon::{EntityKind, ReconConfig};

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="Overpass API">
  <note>The data included in this document is from www.openstreetmap.org.</note>
  <meta osm_base="2020-01-01T00:00:00Z"/>
  <node id="10" lat="59.9" lon="10.7" version="3"/>
  <way id="20" version="1">
    <nd ref="10"/>
    <tag k="name" v="Way &amp; more"/>
  </way>
  <relation id="30" version="7">
    <member type="way" ref="20" role="outer"/>
    <tag k="name" v="Oslo"/>
    <tag k="place" v="municipality"/>
    <tag k="ref" v="0301"/>
    <tag k="population" v="693494"/>
  </relation>
  <relation id="31" version="2">
    <tag k="place" v="municipality"/>
    <tag k="ref" v="Oslo"/>
  </relation>
</osm>
"#;

    fn municipality_level() -> LevelConfig {
        let config = ReconConfig::from_toml(
            r#"
name = "t"
[[levels]]
kind = "municipality"
key = "ref"
select = { place = "municipality" }
"#,
        )
        .unwrap();
        config.levels[0].clone()
    }

    #[test]
    fn parse_keeps_elements_and_drops_noise() {
        let doc = Document::parse(SAMPLE).unwrap();
        assert_eq!(lookup(&doc.attributes, "generator"), Some("Overpass API"));
        assert_eq!(doc.elements.len(), 4);
        assert_eq!(doc.elements[0].element_type, ElementType::Node);
        assert_eq!(doc.elements[1].tag("name"), Some("Way & more"));
        assert_eq!(doc.elements[2].children.len(), 5);
    }

    #[test]
    fn features_select_and_warn_on_bad_keys() {
        let doc = Document::parse(SAMPLE).unwrap();
        let mut report = RunReport::new();
        let features = doc.features(&municipality_level(), &mut report);

        assert_eq!(features.len(), 1);
        assert_eq!(features[0].id.code(), "0301");
        assert_eq!(features[0].element, ElementRef { element_type: ElementType::Relation, id: 30 });
        assert_eq!(features[0].tags.get("population"), Some("693494"));
        assert_eq!(
            report.warnings,
            vec![Warning::MalformedReferenceKey {
                kind: EntityKind::Municipality,
                element: "relation 31".into(),
                value: "Oslo".into(),
            }]
        );
    }

    #[test]
    fn apply_writes_tags_and_flags_only_modified() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        let mut report = RunReport::new();
        let mut features = doc.features(&municipality_level(), &mut report);
        features[0].tags.set("population", "697010");
        features[0].tags.set("population:date", "2020-01-01");
        features[0].modified = true;

        assert_eq!(doc.apply(&features), 1);

        let relation = &doc.elements[2];
        assert!(relation.is_modified());
        assert_eq!(relation.tag("population"), Some("697010"));
        assert_eq!(relation.children[0].name, "member");
        assert_eq!(relation.children.last().unwrap().attribute("k"), Some("population:date"));
        assert_eq!(doc.modified_count(), 1);
    }

    #[test]
    fn written_document_parses_back() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        doc.elements[2].mark_modified();
        let xml = doc.to_xml("popsync v0.5.0").unwrap();

        assert!(xml.contains(r#"generator="popsync v0.5.0""#));
        assert!(xml.contains(r#"upload="false""#));
        assert!(xml.contains("Way &amp; more"));

        let back = Document::parse(&xml).unwrap();
        assert_eq!(back.elements, doc.elements);
    }

    #[test]
    fn new_nodes_count_down_from_first_id() {
        let record = SourceRecord {
            id: EntityId::parse(EntityKind::Settlement, "0100").unwrap(),
            name: "Halden".into(),
            population: Population(80),
            record_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            parent_refs: vec![],
        };
        let governed = Default::default();
        let created = vec![
            popsync_recon::create::new_feature(&record, "ref:ssb_tettsted", &governed, Placement::not_found()),
            popsync_recon::create::new_feature(&record, "ref:ssb_tettsted", &governed, Placement::not_found()),
        ];
        let mut doc = Document::default();
        let mut next_id = FIRST_NEW_NODE_ID;

        doc.add_nodes(&created, &mut next_id);

        assert_eq!(next_id, -1003);
        assert_eq!(doc.elements[0].id(), Some(-1001));
        assert_eq!(doc.elements[1].id(), Some(-1002));
        assert!(doc.elements[0].is_modified());
        assert_eq!(doc.elements[0].attribute("lat"), Some("0"));
        assert_eq!(doc.elements[0].tag("name"), Some("Halden"));
    }

    #[test]
    fn merge_dedupes_by_type_and_id() {
        let mut a = Document::parse(SAMPLE).unwrap();
        let mut b = Document::parse(SAMPLE).unwrap();
        b.elements[2].mark_modified();
        b.elements.push(Element::new(ElementType::Node, 10));
        b.elements.push(Element::new(ElementType::Way, 10));

        a.merge(b);

        assert_eq!(a.elements.len(), 5);
        assert!(a.elements[2].is_modified());
        assert_eq!(a.elements[4].element_type, ElementType::Way);
    }

    fn halden() -> NewFeature {
        let record = SourceRecord {
            id: EntityId::parse(EntityKind::Settlement, "0100").unwrap(),
            name: "Halden".into(),
            population: Population(24800),
            record_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            parent_refs: vec![],
        };
        popsync_recon::create::new_feature(&record, "ref:ssb_tettsted", &Default::default(), Placement::not_found())
    }

    fn hand_added(id: i64, lat: &str) -> Element {
        let mut node = Element::new(ElementType::Node, id);
        node.mark_modified();
        node.set_attribute("lat", lat);
        node.set_attribute("lon", "10.7");
        node.set_tags(&[("name", "hand-added")].into_iter().collect());
        node
    }

    #[test]
    fn new_nodes_skip_ids_already_in_document() {
        let mut doc = Document::default();
        doc.elements.push(hand_added(-1001, "59.9"));
        let mut next_id = FIRST_NEW_NODE_ID;

        doc.add_nodes(&[halden()], &mut next_id);

        let mut merged = Document::default();
        merged.merge(doc);
        let nodes: Vec<(Option<i64>, Option<&str>)> =
            merged.elements.iter().map(|e| (e.id(), e.tag("name"))).collect();
        assert_eq!(nodes, vec![(Some(-1001), Some("hand-added")), (Some(-1002), Some("Halden"))]);
        assert_eq!(next_id, -1003);
    }

    #[test]
    fn merge_renumbers_colliding_new_elements() {
        let mut a = Document::default();
        a.elements.push(hand_added(-1001, "59.9"));
        let mut b = Document::default();
        b.elements.push(hand_added(-1001, "59.9"));
        b.elements.push(hand_added(-1001, "60.1"));

        a.merge(b);

        let ids: Vec<Option<i64>> = a.elements.iter().map(Element::id).collect();
        assert_eq!(ids, vec![Some(-1001), Some(-1002)]);
        assert_eq!(a.elements[1].attribute("lat"), Some("60.1"));
    }

    #[test]
    fn first_free_id_ignores_positive_ids() {
        let doc = Document::parse(SAMPLE).unwrap();
        assert_eq!(doc.first_free_id(), FIRST_NEW_NODE_ID);
    }

    #[test]
    fn rejects_other_roots_and_broken_xml() {
        assert!(matches!(Document::parse("<gpx/>"), Err(IoError::Structure(_))));
        assert!(matches!(Document::parse(""), Err(IoError::Structure(_))));
        assert!(matches!(
            Document::parse("<osm><node id=\"1\"></way></osm>"),
            Err(IoError::Xml(_))
        ));
    }

    #[test]
    fn save_replaces_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.osm");
        std::fs::write(&path, "old").unwrap();

        let doc = Document::parse(SAMPLE).unwrap();
        doc.save("popsync", &path).unwrap();

        let back = Document::read(&path).unwrap();
        assert_eq!(back.elements.len(), 4);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }
}
