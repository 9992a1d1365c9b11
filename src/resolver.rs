//! Selecting one stored profile from an `email[+plan]` selector.

use crate::error::{CandidateHint, Error, Result};
use crate::store::{AuthProfile, Provider};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    pub email: Option<String>,
    pub plan: Option<String>,
}

impl Selector {
    pub fn new(email: Option<String>, plan: Option<String>) -> Self {
        Self { email, plan }
    }

    pub fn email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            plan: None,
        }
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    fn matches(&self, profile: &AuthProfile) -> bool {
        let email_ok = self
            .email
            .as_deref()
            .map_or(true, |email| normalize(email) == normalize(&profile.email));
        let plan_ok = self.plan.as_deref().map_or(true, |plan| {
            profile
                .plan_type
                .as_deref()
                .is_some_and(|candidate| normalize(candidate) == normalize(plan))
        });
        email_ok && plan_ok
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Interactive chooser used when a selector leaves more than one candidate.
pub trait ProfilePicker {
    /// Returns the id of the chosen profile.
    fn pick(&self, provider: Provider, candidates: &[&AuthProfile]) -> Result<String>;
}

fn hints(candidates: &[&AuthProfile]) -> Vec<CandidateHint> {
    candidates
        .iter()
        .map(|profile| CandidateHint {
            id: profile.id.clone(),
            plan_type: profile.plan_type.clone(),
        })
        .collect()
}

fn pick_one<'a>(
    provider: Provider,
    candidates: &[&'a AuthProfile],
    picker: &dyn ProfilePicker,
) -> Result<&'a AuthProfile> {
    let chosen = picker.pick(provider, candidates)?;
    candidates
        .iter()
        .copied()
        .find(|profile| profile.id == chosen)
        .ok_or_else(|| Error::Selection(format!("picked profile {} is not one of the candidates", chosen)))
}

/// Finds the single `provider` profile in `profiles` matching `selector`.
///
/// Without a picker, several matches are an `AmbiguousSelector` error and a
/// missing email is a usage error.
pub fn resolve<'a>(
    profiles: &'a [AuthProfile],
    provider: Provider,
    selector: &Selector,
    picker: Option<&dyn ProfilePicker>,
) -> Result<&'a AuthProfile> {
    let candidates: Vec<&AuthProfile> = profiles
        .iter()
        .filter(|profile| profile.provider == provider)
        .collect();

    if selector.email.is_none() {
        if candidates.is_empty() {
            return Err(Error::NoProfiles { provider });
        }
        let picker = picker.ok_or_else(|| {
            Error::Usage(format!("an email selector is required to choose a {} profile", provider))
        })?;
        let narrowed: Vec<&AuthProfile> = candidates
            .into_iter()
            .filter(|profile| selector.matches(profile))
            .collect();
        if narrowed.is_empty() {
            return Err(Error::ProfileNotFound { provider });
        }
        return pick_one(provider, &narrowed, picker);
    }

    let matches: Vec<&AuthProfile> = candidates
        .into_iter()
        .filter(|profile| selector.matches(profile))
        .collect();
    match matches.as_slice() {
        [] => Err(Error::ProfileNotFound { provider }),
        [only] => Ok(*only),
        _ => match picker {
            Some(picker) => pick_one(provider, &matches, picker),
            None => Err(Error::AmbiguousSelector {
                provider,
                candidates: hints(&matches),
            }),
        },
    }
}
