//! Missing-court analysis: court names the destination failed to resolve,
//! cross-referenced against the courts and states it already knows.

use std::collections::HashMap;
use std::sync::LazyLock;

use lexingest_net::{Backend, Clock, TransportError};
use lexingest_sinks::DestinationClient;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// German court types: code, full name, aliases.
const COURT_TYPES: &[(&str, &str, &[&str])] = &[
    ("AG", "Amtsgericht", &[]),
    ("ARBG", "Arbeitsgericht", &[]),
    ("BAG", "Bundesarbeitsgericht", &[]),
    ("BGH", "Bundesgerichtshof", &[]),
    ("BFH", "Bundesfinanzhof", &[]),
    ("BSG", "Bundessozialgericht", &[]),
    ("BVerfG", "Bundesverfassungsgericht", &[]),
    ("BVerwG", "Bundesverwaltungsgericht", &[]),
    ("BPatG", "Bundespatentgericht", &[]),
    ("FG", "Finanzgericht", &[]),
    ("LAG", "Landesarbeitsgericht", &[]),
    ("LSG", "Landessozialgericht", &[]),
    ("LVG", "Landesverfassungsgericht", &[]),
    ("LBGH", "Landesberufsgericht", &[]),
    ("LG", "Landgericht", &[]),
    ("OLG", "Oberlandesgericht", &[]),
    ("OBLG", "Oberstes Landesgericht", &[]),
    ("OVG", "Oberverwaltungsgericht", &[]),
    ("SG", "Sozialgericht", &[]),
    ("STGH", "Staatsgerichtshof", &[]),
    ("SCHG", "Schifffahrtsgericht", &[]),
    ("SCHOG", "Schifffahrtsobergericht", &[]),
    ("VERFG", "Verfassungsgerichtshof", &["Verfassungsgericht"]),
    ("VG", "Verwaltungsgericht", &[]),
    ("VGH", "Verwaltungsgerichtshof", &[]),
    ("KG", "Kammergericht", &[]),
    ("EuGH", "Europäischer Gerichtshof", &[]),
    ("AWG", "Anwaltsgericht", &["Anwaltsgerichtshof"]),
    ("MSCHOG", "Moselschifffahrtsobergericht", &[]),
    ("RSCHGD", "Rheinschifffahrtsgericht", &[]),
    ("RSCHOG", "Rheinschifffahrtsobergericht", &[]),
];

/// Words between the court type and the place, e.g. "Landgericht des Landes Berlin".
const FILLER_WORDS: [&str; 6] = [
    "für das Land",
    "des Landes",
    "des Freistaates",
    "des Saarlandes",
    "der Freien Hansestadt",
    "der Freien und Hansestadt",
];

/// Adjective endings dropped before comparing places ("Schleswig-Holsteinisches").
const ADJECTIVE_SUFFIXES: [&str; 6] = ["isches", "ische", "ischer", "isch", "es", "er"];

/// Every type name and alias with its code, longest first.
static NAMES_TO_CODE: LazyLock<Vec<(&str, &str)>> = LazyLock::new(|| {
    let mut names: Vec<_> = COURT_TYPES
        .iter()
        .flat_map(|&(code, name, aliases)| {
            std::iter::once((name, code)).chain(aliases.iter().map(move |&alias| (alias, code)))
        })
        .collect();
    names.sort_by_key(|&(name, _)| std::cmp::Reverse(name.chars().count()));
    names
});

/// The destination's court resolver error, as it appears in API error bodies
/// and therefore in the run logs. Escaped quotes end the name too.
static MISSING_COURT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Could not resolve court from name:\s*(.+?)(?:['"}\\]|\s*$)"#)
        .expect("missing-court pattern is valid")
});

/// A court as listed by the destination's `/api/courts/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourtRecord {
    pub name: String,
    pub code: String,
    pub court_type: String,
    pub city_name: Option<String>,
    /// Id into `/api/states/`.
    pub state: Option<i64>,
}

/// A federal state as listed by the destination's `/api/states/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateRecord {
    pub id: i64,
    pub name: String,
}

/// One unresolved court name and the existing courts that might be meant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingCourt {
    pub name: String,
    pub count: u64,
    pub type_code: Option<&'static str>,
    /// Full type name, empty without a type code.
    pub type_label: &'static str,
    pub location: String,
    /// Courts whose city appears in the location (or the other way round).
    pub city_courts: Vec<CourtRecord>,
    /// Courts in the first state matching the location.
    pub state_courts: Vec<CourtRecord>,
    pub matched_state: Option<String>,
}

/// Count unresolved court names in log `lines`, most frequent first.
///
/// Ties keep the order in which the names first appeared.
pub fn parse_missing_courts<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<(String, u64)> {
    let mut counts: Vec<(String, u64)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for line in lines {
        let Some(caps) = MISSING_COURT.captures(line) else {
            continue;
        };
        let name = caps[1].trim();
        if name.is_empty() {
            continue;
        }
        match index.get(name) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(name.to_string(), counts.len());
                counts.push((name.to_string(), 1));
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Court type code for `name`: a leading abbreviation ("OLG Hamm"), else
/// the longest full name or alias it contains ("Oberlandesgericht Hamm").
pub fn extract_type_code(name: &str) -> Option<&'static str> {
    let leading = COURT_TYPES.iter().map(|&(code, ..)| code).find(|code| {
        name.strip_prefix(*code)
            .is_some_and(|rest| !rest.chars().next().is_some_and(is_word_char))
    });
    leading.or_else(|| {
        NAMES_TO_CODE
            .iter()
            .find(|(type_name, _)| name.contains(*type_name))
            .map(|&(_, code)| code)
    })
}

fn type_label(code: &str) -> &'static str {
    COURT_TYPES
        .iter()
        .find(|&&(c, ..)| c == code)
        .map_or("", |&(_, name, _)| name)
}

/// Remove every whole-word occurrence of `word` and the whitespace after it.
fn strip_word(text: &str, word: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find(word) {
        let end = at + word.len();
        let before = rest[..at].chars().next_back().or_else(|| out.chars().next_back());
        let after = rest[end..].chars().next();
        if before.is_some_and(is_word_char) || after.is_some_and(is_word_char) {
            out.push_str(&rest[..end]);
            rest = &rest[end..];
            continue;
        }
        out.push_str(&rest[..at]);
        rest = rest[end..].trim_start();
    }
    out.push_str(rest);
    out
}

/// The place part of a court name: type abbreviation, type names and
/// filler words removed.
pub fn extract_location(name: &str, type_code: Option<&str>) -> String {
    let mut location = name.to_string();
    if let Some(code) = type_code {
        location = strip_word(&location, code);
        if let Some(&(_, type_name, aliases)) = COURT_TYPES.iter().find(|&&(c, ..)| c == code) {
            let mut labels: Vec<&str> = std::iter::once(type_name).chain(aliases.iter().copied()).collect();
            labels.sort_by_key(|label| std::cmp::Reverse(label.len()));
            for label in labels {
                location = location.replace(label, "");
            }
        }
    }
    for filler in FILLER_WORDS {
        location = location.replace(filler, "");
    }
    location.trim_matches([' ', '-', ',']).to_string()
}

fn normalize_for_match(text: &str) -> String {
    let mut t = text.trim().to_lowercase();
    if let Some(suffix) = ADJECTIVE_SUFFIXES
        .iter()
        .find(|s| t.ends_with(*s) && t.chars().count() > s.len() + 2)
    {
        t.truncate(t.len() - suffix.len());
    }
    t
}

/// Cross-reference `missing` names against the destination's courts and states.
pub fn analyze_missing_courts(
    missing: &[(String, u64)],
    courts: &[CourtRecord],
    states: &[StateRecord],
) -> Vec<MissingCourt> {
    let state_names: HashMap<i64, String> = states
        .iter()
        .map(|s| (s.id, s.name.to_lowercase()))
        .collect();

    missing
        .iter()
        .map(|(name, count)| {
            let type_code = extract_type_code(name);
            let location = extract_location(name, type_code);
            let mut analysis = MissingCourt {
                name: name.clone(),
                count: *count,
                type_code,
                type_label: type_code.map_or("", type_label),
                location,
                city_courts: Vec::new(),
                state_courts: Vec::new(),
                matched_state: None,
            };
            // An empty location is contained in every place name.
            if analysis.location.is_empty() {
                return analysis;
            }

            let loc = analysis.location.to_lowercase();
            analysis.city_courts = courts
                .iter()
                .filter(|c| {
                    c.city_name
                        .as_deref()
                        .map(str::to_lowercase)
                        .is_some_and(|city| !city.is_empty() && (loc.contains(&city) || city.contains(&loc)))
                })
                .cloned()
                .collect();

            let loc_norm = normalize_for_match(&analysis.location);
            let matched = states.iter().map(|s| s.name.to_lowercase()).find(|state| {
                let norm = normalize_for_match(state);
                !norm.is_empty() && (loc_norm.contains(&norm) || norm.contains(&loc_norm))
            });
            if let Some(state) = matched {
                analysis.state_courts = courts
                    .iter()
                    .filter(|c| {
                        c.state
                            .and_then(|id| state_names.get(&id))
                            .is_some_and(|name| *name == state)
                    })
                    .cloned()
                    .collect();
                analysis.matched_state = Some(state);
            }
            analysis
        })
        .collect()
}

fn decode<T: for<'de> Deserialize<'de>>(values: Vec<Value>) -> Result<Vec<T>, TransportError> {
    values
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<_, _>>()
        .map_err(TransportError::from)
}

/// All courts and states known to the destination.
pub fn fetch_court_data<B: Backend, C: Clock>(
    client: &DestinationClient<B, C>,
) -> Result<(Vec<CourtRecord>, Vec<StateRecord>), TransportError> {
    let courts: Vec<CourtRecord> = decode(client.list_all("/api/courts/?format=json")?)?;
    debug!(courts = courts.len(), "fetched courts");
    let states: Vec<StateRecord> = decode(client.list_all("/api/states/?format=json")?)?;
    info!(courts = courts.len(), states = states.len(), "fetched court data");
    Ok((courts, states))
}
