// dqcheck-core/src/application/rule_store.rs

use chrono::Utc;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, instrument};

use crate::domain::error::DomainError;
use crate::domain::rules::{Rule, RuleDefinition, RuleId};
use crate::error::DqError;
use crate::ports::rule_repository::RuleRepository;

struct State {
    rules: Vec<Rule>,
    next_id: u64,
}

/// Rule id → rule. Read-mostly; every change is written through the
/// repository before it becomes visible.
pub struct RuleStore {
    state: RwLock<State>,
    repository: Arc<dyn RuleRepository>,
}

impl RuleStore {
    /// Loads the current set from `repository`.
    pub fn open(repository: Arc<dyn RuleRepository>) -> Result<Self, DqError> {
        let rules = repository.load()?;
        let next_id = rules.iter().map(|r| r.rule_id.0).max().unwrap_or(0) + 1;
        info!(rules = rules.len(), "rule store opened");
        Ok(Self {
            state: RwLock::new(State { rules, next_id }),
            repository,
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, DqError> {
        self.state
            .read()
            .map_err(|_| DqError::InternalError("Rule store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, DqError> {
        self.state
            .write()
            .map_err(|_| DqError::InternalError("Rule store lock poisoned".into()))
    }

    /// Persists `rules` then swaps them in. On failure nothing changes.
    fn commit(&self, state: &mut State, rules: Vec<Rule>) -> Result<(), DqError> {
        self.repository.save(&rules)?;
        state.rules = rules;
        Ok(())
    }

    #[instrument(skip(self, definition))]
    pub fn create_rule(&self, definition: RuleDefinition) -> Result<Rule, DqError> {
        let mut created = self.create_rules(vec![definition])?;
        created
            .pop()
            .ok_or_else(|| DqError::InternalError("rule was not created".into()))
    }

    /// Creates several rules at once. Every definition is validated, names
    /// included, before anything is written; one bad rule rejects them all.
    #[instrument(skip(self, definitions), fields(count = definitions.len()))]
    pub fn create_rules(&self, definitions: Vec<RuleDefinition>) -> Result<Vec<Rule>, DqError> {
        let mut state = self.write()?;
        let mut rules = state.rules.clone();
        let mut created = Vec::with_capacity(definitions.len());

        for definition in definitions {
            let id = RuleId(state.next_id + created.len() as u64);
            let rule = definition.into_rule(id, Utc::now())?;
            ensure_unique_name(&rules, &rule.name, None)?;
            rules.push(rule.clone());
            created.push(rule);
        }
        if created.is_empty() {
            return Ok(created);
        }

        self.commit(&mut state, rules)?;
        state.next_id += created.len() as u64;

        for rule in &created {
            info!(rule_id = %rule.rule_id, rule_type = %rule.rule_type(), "rule created");
        }
        Ok(created)
    }

    /// Merges `patch` onto the current rule and re-validates the result.
    #[instrument(skip(self, patch))]
    pub fn update_rule(&self, id: RuleId, patch: RuleDefinition) -> Result<Rule, DqError> {
        let mut state = self.write()?;
        let pos = position(&state.rules, id)?;
        let current = &state.rules[pos];

        let merged = current.to_definition().merge(patch);
        let mut updated = merged.into_rule(id, current.created_at)?;
        updated.is_active = current.is_active;
        updated.updated_at = Some(Utc::now());
        if updated.is_active {
            ensure_unique_name(&state.rules, &updated.name, Some(id))?;
        }

        let mut rules = state.rules.clone();
        rules[pos] = updated.clone();
        self.commit(&mut state, rules)?;

        info!(rule_id = %id, "rule updated");
        Ok(updated)
    }

    /// Soft delete. Deactivating an inactive rule is a no-op.
    #[instrument(skip(self))]
    pub fn deactivate_rule(&self, id: RuleId) -> Result<Rule, DqError> {
        let mut state = self.write()?;
        let pos = position(&state.rules, id)?;
        if !state.rules[pos].is_active {
            debug!(rule_id = %id, "rule already inactive");
            return Ok(state.rules[pos].clone());
        }

        let mut rules = state.rules.clone();
        rules[pos].is_active = false;
        rules[pos].updated_at = Some(Utc::now());
        let rule = rules[pos].clone();
        self.commit(&mut state, rules)?;

        info!(rule_id = %id, "rule deactivated");
        Ok(rule)
    }

    pub fn get_rule(&self, id: RuleId) -> Result<Rule, DqError> {
        let state = self.read()?;
        let pos = position(&state.rules, id)?;
        Ok(state.rules[pos].clone())
    }

    /// Active rules in insertion order.
    pub fn list_active_rules(&self) -> Result<Vec<Rule>, DqError> {
        self.list_rules(false)
    }

    pub fn list_rules(&self, include_inactive: bool) -> Result<Vec<Rule>, DqError> {
        let state = self.read()?;
        Ok(state
            .rules
            .iter()
            .filter(|r| include_inactive || r.is_active)
            .cloned()
            .collect())
    }

    /// Consistent copy of every rule, active or not, taken under one lock.
    pub fn snapshot(&self) -> Result<Vec<Rule>, DqError> {
        self.list_rules(true)
    }
}

fn position(rules: &[Rule], id: RuleId) -> Result<usize, DqError> {
    rules
        .iter()
        .position(|r| r.rule_id == id)
        .ok_or_else(|| DomainError::RuleNotFound(id).into())
}

fn ensure_unique_name(rules: &[Rule], name: &str, except: Option<RuleId>) -> Result<(), DqError> {
    let wanted = name.trim().to_lowercase();
    let clash = rules.iter().any(|r| {
        r.is_active && Some(r.rule_id) != except && r.name.trim().to_lowercase() == wanted
    });
    if clash {
        return Err(DomainError::InvalidRule(format!(
            "an active rule named '{}' already exists",
            name
        ))
        .into());
    }
    Ok(())
}
