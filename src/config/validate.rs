// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use crate::client::pacing::{DEFAULT_ACK_TIMEOUT, DEFAULT_RANDOM_CEILING};
use crate::client::{ClientOptions, PacingPolicy, DEFAULT_CONNECT_TIMEOUT};
use crate::config::model::{ClientSection, HtgFile, RawHtgFile};
use crate::dag::schedule;
use crate::errors::{HtgError, Result};
use crate::job::builder::validate_resources;
use crate::metagraph::{Metagraph, Relation, SubGraph};
use crate::types::{ConfigMap, PacingKind};

impl TryFrom<RawHtgFile> for HtgFile {
    type Error = HtgError;

    fn try_from(raw: RawHtgFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_subgraphs(&raw)?;
        ensure_named(&raw)?;

        let subgraphs: Vec<SubGraph> = raw
            .subgraph
            .iter()
            .map(|s| SubGraph::new(s.name.clone(), s.cpu, s.ram_mb, s.disk_gb, s.instances))
            .collect();
        let relations: Vec<Relation> = raw
            .relation
            .iter()
            .map(|r| Relation::new(r.parent.clone(), r.child.clone()))
            .collect();

        let metagraph = Metagraph::new(raw.htg.name.clone(), subgraphs, relations)?;
        let schedule = schedule(&metagraph)?;
        for subgraph in metagraph.subgraphs() {
            validate_resources(subgraph)?;
        }

        Ok(HtgFile {
            metagraph,
            worker_class: raw.htg.worker_class,
            master: raw.client.master.clone(),
            client: client_options(&raw.client)?,
            submit: raw.submit,
            cluster: to_config_map("cluster", raw.cluster)?,
            job_config: to_config_map("job_config", raw.job_config)?,
            schedule,
        })
    }
}

fn ensure_has_subgraphs(raw: &RawHtgFile) -> Result<()> {
    if raw.subgraph.is_empty() {
        return Err(HtgError::ConfigError(
            "HTG must contain at least one [[subgraph]] entry".to_string(),
        ));
    }
    Ok(())
}

fn ensure_named(raw: &RawHtgFile) -> Result<()> {
    if raw.htg.name.trim().is_empty() {
        return Err(HtgError::ConfigError("[htg].name must not be empty".to_string()));
    }
    if raw.htg.worker_class.trim().is_empty() {
        return Err(HtgError::ConfigError(
            "[htg].worker_class must not be empty".to_string(),
        ));
    }
    if let Some(s) = raw.subgraph.iter().find(|s| s.name.trim().is_empty()) {
        return Err(HtgError::ConfigError(format!(
            "[[subgraph]] entry with cpu = {} has an empty name",
            s.cpu
        )));
    }
    Ok(())
}

fn client_options(section: &ClientSection) -> Result<ClientOptions> {
    let mut options = ClientOptions::default();

    if let Some(s) = &section.connect_timeout {
        options.connect_timeout = parse_field("connect_timeout", s)?;
    }
    options.connect_timeout = non_zero("connect_timeout", options.connect_timeout, DEFAULT_CONNECT_TIMEOUT)?;

    options.pacing = match section.pacing.unwrap_or_default() {
        PacingKind::Ack => {
            if section.pacing_ceiling.is_some() {
                return Err(HtgError::ConfigError(
                    "[client].pacing_ceiling only applies to pacing = \"random\"".to_string(),
                ));
            }
            let timeout = match &section.ack_timeout {
                Some(s) => parse_field("ack_timeout", s)?,
                None => DEFAULT_ACK_TIMEOUT,
            };
            PacingPolicy::MasterAck {
                timeout: non_zero("ack_timeout", timeout, DEFAULT_ACK_TIMEOUT)?,
            }
        }
        PacingKind::Random => {
            if section.ack_timeout.is_some() {
                return Err(HtgError::ConfigError(
                    "[client].ack_timeout only applies to pacing = \"ack\"".to_string(),
                ));
            }
            let ceiling = match &section.pacing_ceiling {
                Some(s) => parse_field("pacing_ceiling", s)?,
                None => DEFAULT_RANDOM_CEILING,
            };
            PacingPolicy::RandomDelay { ceiling }
        }
    };

    Ok(options)
}

fn non_zero(field: &str, value: Duration, default: Duration) -> Result<Duration> {
    if value.is_zero() {
        return Err(HtgError::ConfigError(format!(
            "[client].{field} must be > 0 (default {}ms)",
            default.as_millis()
        )));
    }
    Ok(value)
}

fn parse_field(field: &str, s: &str) -> Result<Duration> {
    parse_duration(s).map_err(|e| HtgError::ConfigError(format!("[client].{field}: {e}")))
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    let scaled = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large"))
    };

    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => scaled(60),
        "h" => scaled(60 * 60),
        unit => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}

/// Flatten a TOML table of scalars into string key/values.
fn to_config_map(section: &str, table: BTreeMap<String, toml::Value>) -> Result<ConfigMap> {
    table
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                other => {
                    return Err(HtgError::ConfigError(format!(
                        "[{section}].{key} must be a string, number or boolean (got {})",
                        other.type_str()
                    )));
                }
            };
            Ok((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 3s ").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let err = parse_duration("400000000000000000m").unwrap_err();
        assert!(err.contains("too large"), "unexpected error: {err}");
        assert!(parse_duration("18446744073709551615h").is_err());
        // Seconds and milliseconds never scale, so the full range is fine.
        assert!(parse_duration("18446744073709551615s").is_ok());
    }

    #[test]
    fn client_defaults_to_ack_pacing() {
        let options = client_options(&ClientSection::default()).unwrap();
        assert_eq!(
            options.pacing,
            PacingPolicy::MasterAck {
                timeout: DEFAULT_ACK_TIMEOUT
            }
        );
        assert_eq!(options.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn random_pacing_reads_ceiling() {
        let section = ClientSection {
            pacing: Some(PacingKind::Random),
            pacing_ceiling: Some("500ms".to_string()),
            ..ClientSection::default()
        };
        let options = client_options(&section).unwrap();
        assert_eq!(
            options.pacing,
            PacingPolicy::RandomDelay {
                ceiling: Duration::from_millis(500)
            }
        );
    }

    #[test]
    fn pacing_fields_must_match_kind() {
        let section = ClientSection {
            pacing: Some(PacingKind::Ack),
            pacing_ceiling: Some("1s".to_string()),
            ..ClientSection::default()
        };
        assert!(matches!(client_options(&section), Err(HtgError::ConfigError(_))));
    }

    #[test]
    fn zero_connect_timeout_is_rejected() {
        let section = ClientSection {
            connect_timeout: Some("0s".to_string()),
            ..ClientSection::default()
        };
        assert!(matches!(client_options(&section), Err(HtgError::ConfigError(_))));
    }

    #[test]
    fn scalar_values_become_strings() {
        let mut table = BTreeMap::new();
        table.insert("a".to_string(), toml::Value::Integer(4));
        table.insert("b".to_string(), toml::Value::Boolean(true));
        table.insert("c".to_string(), toml::Value::String("x".to_string()));
        let map = to_config_map("job_config", table).unwrap();
        assert_eq!(map.get("a"), Some("4"));
        assert_eq!(map.get("b"), Some("true"));
        assert_eq!(map.get("c"), Some("x"));
    }

    #[test]
    fn nested_tables_are_rejected() {
        let mut table = BTreeMap::new();
        table.insert("nested".to_string(), toml::Value::Array(Vec::new()));
        assert!(matches!(
            to_config_map("cluster", table),
            Err(HtgError::ConfigError(_))
        ));
    }
}
