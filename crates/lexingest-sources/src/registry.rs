//! Name -> constructor map for source adapters, built once at startup.

use std::collections::BTreeMap;

use lexingest_core::Command;

use crate::fixture::{FixtureCaseSource, FixtureLawSource};
use crate::ris::{RisCaseSource, RisLawSource};
use crate::{CaseLawSource, LegislationSource, SourceError, SourceOptions};

pub type LawFactory = fn(&SourceOptions) -> Result<Box<dyn LegislationSource>, SourceError>;
pub type CaseFactory = fn(&SourceOptions) -> Result<Box<dyn CaseLawSource>, SourceError>;

struct Entry<F> {
    build: F,
    /// Expected to report regularly; absence shows up as stale in status.
    monitored: bool,
}

/// Registry of provider names for both commands.
pub struct SourceRegistry {
    laws: BTreeMap<&'static str, Entry<LawFactory>>,
    cases: BTreeMap<&'static str, Entry<CaseFactory>>,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SourceRegistry {
    pub fn empty() -> Self {
        Self {
            laws: BTreeMap::new(),
            cases: BTreeMap::new(),
        }
    }

    /// Every adapter shipped with this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register_laws("dummy", false, dummy_laws);
        registry.register_laws("ris", true, ris_laws);
        registry.register_cases("dummy", false, dummy_cases);
        registry.register_cases("ris", true, ris_cases);
        registry
    }

    pub fn register_laws(&mut self, name: &'static str, monitored: bool, build: LawFactory) {
        self.laws.insert(name, Entry { build, monitored });
    }

    pub fn register_cases(&mut self, name: &'static str, monitored: bool, build: CaseFactory) {
        self.cases.insert(name, Entry { build, monitored });
    }

    pub fn law_source(
        &self,
        name: &str,
        options: &SourceOptions,
    ) -> Result<Box<dyn LegislationSource>, SourceError> {
        match self.laws.get(name) {
            Some(entry) => (entry.build)(options),
            None => Err(unknown(Command::Laws, name, self.names(Command::Laws))),
        }
    }

    pub fn case_source(
        &self,
        name: &str,
        options: &SourceOptions,
    ) -> Result<Box<dyn CaseLawSource>, SourceError> {
        match self.cases.get(name) {
            Some(entry) => (entry.build)(options),
            None => Err(unknown(Command::Cases, name, self.names(Command::Cases))),
        }
    }

    /// Registered provider names for `command`, sorted.
    pub fn names(&self, command: Command) -> Vec<&'static str> {
        match command {
            Command::Laws => self.laws.keys().copied().collect(),
            Command::Cases => self.cases.keys().copied().collect(),
        }
    }

    /// `(command, provider)` pairs expected to appear in the result store.
    pub fn monitored(&self) -> Vec<(Command, &'static str)> {
        let laws = self
            .laws
            .iter()
            .filter(|(_, e)| e.monitored)
            .map(|(&name, _)| (Command::Laws, name));
        let cases = self
            .cases
            .iter()
            .filter(|(_, e)| e.monitored)
            .map(|(&name, _)| (Command::Cases, name));
        laws.chain(cases).collect()
    }
}

fn unknown(command: Command, name: &str, available: Vec<&'static str>) -> SourceError {
    SourceError::UnknownProvider {
        command: command.as_str(),
        name: name.to_string(),
        available: available.join(", "),
    }
}

fn fixture_path(options: &SourceOptions) -> Result<&std::path::Path, SourceError> {
    options
        .path
        .as_deref()
        .ok_or_else(|| SourceError::Config("the dummy provider requires --path".into()))
}

fn dummy_laws(options: &SourceOptions) -> Result<Box<dyn LegislationSource>, SourceError> {
    Ok(Box::new(FixtureLawSource::open(fixture_path(options)?)?))
}

fn dummy_cases(options: &SourceOptions) -> Result<Box<dyn CaseLawSource>, SourceError> {
    Ok(Box::new(FixtureCaseSource::open(fixture_path(options)?)?))
}

fn ris_laws(options: &SourceOptions) -> Result<Box<dyn LegislationSource>, SourceError> {
    Ok(Box::new(RisLawSource::new(options)?))
}

fn ris_cases(options: &SourceOptions) -> Result<Box<dyn CaseLawSource>, SourceError> {
    Ok(Box::new(RisCaseSource::new(options)?))
}
