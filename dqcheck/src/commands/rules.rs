// dqcheck/src/commands/rules.rs
//
// USE CASE: Rule CRUD.

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

use dqcheck_core::domain::rules::RuleDefinition;

use super::render::rules_table;
use super::{AppContext, print_json, read_document};
use crate::cli::RulesCommand;

/// A rule file holds one definition or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum RuleFile {
    Many(Vec<RuleDefinition>),
    One(Box<RuleDefinition>),
}

pub fn execute(project_dir: &Path, action: RulesCommand, json: bool) -> Result<()> {
    let ctx = AppContext::load(project_dir)?;
    let store = &ctx.rules;

    match action {
        RulesCommand::Create { file } => {
            let definitions = match read_document::<RuleFile>(&file)? {
                RuleFile::Many(defs) => defs,
                RuleFile::One(def) => vec![*def],
            };
            // All or nothing: one bad definition leaves the store untouched
            let created = store.create_rules(definitions)?;
            if json {
                print_json(&created)?;
            } else {
                for rule in &created {
                    println!("✨ Created rule {} '{}'", rule.rule_id, rule.name);
                }
            }
        }
        RulesCommand::Update { id, file } => {
            let patch: RuleDefinition = read_document(&file)?;
            let rule = store.update_rule(id, patch)?;
            if json {
                print_json(&rule)?;
            } else {
                println!("✏️  Updated rule {} '{}'", rule.rule_id, rule.name);
            }
        }
        RulesCommand::Deactivate { id } => {
            let rule = store.deactivate_rule(id)?;
            if json {
                print_json(&rule)?;
            } else {
                println!("🗑️  Rule {} '{}' is inactive", rule.rule_id, rule.name);
            }
        }
        RulesCommand::List { all } => {
            let rules = store.list_rules(all)?;
            if json {
                print_json(&rules)?;
            } else if rules.is_empty() {
                println!("No rules yet. Create one with `dqcheck rules create --file rule.yaml`.");
            } else {
                println!("{}", rules_table(&rules));
            }
        }
        RulesCommand::Show { id } => {
            let rule = store.get_rule(id)?;
            if json {
                print_json(&rule)?;
            } else {
                print!("{}", serde_yaml::to_string(&rule)?);
            }
        }
    }
    Ok(())
}
