use crate::models::{Grade, ResolvedMetadata, RuleStatus, ValidationResult};
use crate::rules::{RuleDefinition, default_rules};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Promote every `warn` outcome to `error`.
    pub strict: bool,
    /// Rule ids to skip; their weight leaves the total for this run.
    pub disabled_rules: HashSet<String>,
}

impl ValidateOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn with_disabled<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled_rules.extend(ids.into_iter().map(Into::into));
        self
    }
}

/// Runs an ordered rule list over metadata and turns the outcomes into a score.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<RuleDefinition>,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl RuleEngine {
    pub fn new(rules: Vec<RuleDefinition>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RuleDefinition] {
        &self.rules
    }

    pub fn validate(&self, metadata: &ResolvedMetadata, options: &ValidateOptions) -> ValidationResult {
        validate_with_rules(metadata, &self.rules, options)
    }
}

/// Runs `rules` in order. Disabled rules are skipped and their weight leaves the total.
pub fn validate_with_rules(
    metadata: &ResolvedMetadata,
    rules: &[RuleDefinition],
    options: &ValidateOptions,
) -> ValidationResult {
    let mut passed = Vec::new();
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    for rule in rules {
        if options.disabled_rules.contains(rule.id) {
            continue;
        }

        let mut outcome = rule.run(metadata);
        if options.strict && outcome.status == RuleStatus::Warn {
            outcome.status = RuleStatus::Error;
        }

        match outcome.status {
            RuleStatus::Pass => passed.push(outcome),
            RuleStatus::Warn => warnings.push(outcome),
            RuleStatus::Error => errors.push(outcome),
        }
    }

    let passed_weight: u32 = passed.iter().map(|r| r.weight).sum();
    let warned_weight: u32 = warnings.iter().map(|r| r.weight).sum();
    let errored_weight: u32 = errors.iter().map(|r| r.weight).sum();
    let score = compute_score(
        passed_weight,
        warned_weight,
        passed_weight + warned_weight + errored_weight,
    );

    ValidationResult {
        score,
        grade: Grade::from_score(score),
        passed,
        warnings,
        errors,
    }
}

/// `round(passed + warned / 2)`, rescaled to 0-100 when the active weights
/// do not total 100 (disabled or substituted rules). An empty rule set scores 100.
pub fn compute_score(passed_weight: u32, warned_weight: u32, total_weight: u32) -> u32 {
    if total_weight == 0 {
        return 100;
    }

    let earned = f64::from(passed_weight) + 0.5 * f64::from(warned_weight);
    let scaled = earned * 100.0 / f64::from(total_weight);
    (scaled.round() as u32).min(100)
}

/// Scores metadata against the built-in rule list.
pub fn validate_metadata(metadata: &ResolvedMetadata, options: &ValidateOptions) -> ValidationResult {
    RuleEngine::default().validate(metadata, options)
}
