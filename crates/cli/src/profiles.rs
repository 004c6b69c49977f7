//! Built-in run profiles, overridable with `--config`.

use std::path::{Path, PathBuf};

use popsync_recon::ReconConfig;

use crate::CliError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Profile {
    Norway,
    Sweden,
    Urban,
}

impl Profile {
    fn builtin(self) -> &'static str {
        match self {
            Self::Norway => include_str!("../profiles/norway.toml"),
            Self::Sweden => include_str!("../profiles/sweden.toml"),
            Self::Urban => include_str!("../profiles/urban.toml"),
        }
    }
}

/// Parse and validate `path` if given, else the built-in profile.
pub(crate) fn load(profile: Profile, path: Option<&Path>) -> Result<ReconConfig, CliError> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| CliError::io(format!("cannot read config {}: {e}", path.display())))?;
            ReconConfig::from_toml(&text)
                .map_err(|e| CliError::from(e).with_hint(format!("in {}", path.display())))?
        }
        None => ReconConfig::from_toml(profile.builtin())?,
    };
    log::debug!("profile '{}' with {} level(s)", config.name, config.levels.len());
    Ok(config)
}

/// `--out` if given, else the profile's output name with `{year}` filled in.
pub(crate) fn output_path(config: &ReconConfig, out: Option<PathBuf>, year: Option<i32>) -> PathBuf {
    if let Some(out) = out {
        return out;
    }
    let name = config.output.as_deref().unwrap_or("population.osm");
    match year {
        Some(year) => PathBuf::from(name.replace("{year}", &year.to_string())),
        None => PathBuf::from(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit_codes;
    use popsync_recon::EntityKind;

    #[test]
    fn builtin_profiles_are_valid() {
        for profile in [Profile::Norway, Profile::Sweden, Profile::Urban] {
            let config = load(profile, None).unwrap();
            assert!(config.levels.iter().all(|l| l.query.is_some()), "{profile:?}");
        }
    }

    #[test]
    fn norway_excludes_oslo_and_svalbard_counties() {
        let config = load(Profile::Norway, None).unwrap();
        let county = config.level(EntityKind::County).unwrap();
        assert_eq!(county.exclude, vec!["03", "21"]);
        assert_eq!(county.key.as_deref(), Some("ref"));
    }

    #[test]
    fn urban_has_split_table_and_source_tag() {
        let config = load(Profile::Urban, None).unwrap();
        let rules = config.split_rules().unwrap();
        let composites: Vec<&str> = rules.iter().map(|r| r.composite_id.code()).collect();
        assert_eq!(composites, vec!["0022", "0801", "3005", "4522"]);
        assert_eq!(
            config.tags.source.as_ref().map(|s| s.value.as_str()),
            Some("SSB - befolkning i tettstedet")
        );
    }

    #[test]
    fn output_names() {
        let urban = load(Profile::Urban, None).unwrap();
        assert_eq!(output_path(&urban, None, Some(2020)), PathBuf::from("tettsted_2020.osm"));
        let norway = load(Profile::Norway, None).unwrap();
        assert_eq!(output_path(&norway, None, None), PathBuf::from("Update_population.osm"));
        assert_eq!(
            output_path(&norway, Some(PathBuf::from("x.osm")), None),
            PathBuf::from("x.osm")
        );
    }

    #[test]
    fn config_errors_map_to_config_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "name = \"x\"\nlevels = []\n").unwrap();

        let err = load(Profile::Norway, Some(&path)).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_CONFIG);

        let err = load(Profile::Norway, Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_IO);
    }
}
