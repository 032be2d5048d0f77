//! Semantic validation of a model declaration.
//!
//! Every check appends a finding; the caller gets all of them in one
//! `ModelError::Validation` instead of fixing the model one error at a time.

use std::collections::BTreeSet;

use crate::condition::Condition;
use crate::def::{AgentDef, FunctionDef, ModelDef};
use crate::error::{ModelError, ModelResult};

/// Validate a model declaration; `Ok(())` only when no finding was made.
pub fn validate_model(model: &ModelDef) -> ModelResult<()> {
    let mut findings = Vec::new();

    if model.agents.is_empty() {
        findings.push("model declares no agents".to_owned());
    }

    check_duplicates(
        model.agents.iter().map(|a| a.name.as_str()),
        "agent",
        &mut findings,
    );
    check_duplicates(
        model.messages.iter().map(|m| m.name.as_str()),
        "message",
        &mut findings,
    );
    check_duplicates(
        model.time_units.iter().map(|t| t.name.as_str()),
        "time unit",
        &mut findings,
    );

    for message in &model.messages {
        check_duplicates(
            message.vars.iter().map(|v| v.name.as_str()),
            &format!("variable of message {:?}", message.name),
            &mut findings,
        );
    }

    for unit in &model.time_units {
        if unit.unit != "iteration" && !model.has_time_unit(&unit.unit) {
            findings.push(format!(
                "time unit {:?} is based on undeclared unit {:?}",
                unit.name, unit.unit
            ));
        }
        if unit.period == 0 {
            findings.push(format!("time unit {:?} has period 0", unit.name));
        }
    }

    for agent in &model.agents {
        validate_agent(model, agent, &mut findings);
    }

    if findings.is_empty() {
        Ok(())
    } else {
        Err(ModelError::Validation(findings.join("\n")))
    }
}

fn validate_agent(model: &ModelDef, agent: &AgentDef, findings: &mut Vec<String>) {
    check_duplicates(
        agent.vars.iter().map(|v| v.name.as_str()),
        &format!("variable of agent {:?}", agent.name),
        findings,
    );
    check_duplicates(
        agent.functions.iter().map(|f| f.name.as_str()),
        &format!("function of agent {:?}", agent.name),
        findings,
    );
    if agent.functions.is_empty() {
        findings.push(format!("agent {:?} declares no functions", agent.name));
        return;
    }

    for function in &agent.functions {
        validate_function(model, agent, function, findings);
    }

    check_start_state(agent, findings);
    check_conditional_states(agent, findings);
}

fn validate_function(
    model: &ModelDef,
    agent: &AgentDef,
    function: &FunctionDef,
    findings: &mut Vec<String>,
) {
    let who = format!("function {:?} of agent {:?}", function.name, agent.name);

    if function.current_state.is_empty() || function.next_state.is_empty() {
        findings.push(format!("{who} is missing a current or next state"));
    }
    for msg in function.inputs.iter().chain(&function.outputs) {
        if model.message(msg).is_none() {
            findings.push(format!("{who} references undeclared message {msg:?}"));
        }
    }
    for msg in &function.inputs {
        if function.outputs.contains(msg) {
            findings.push(format!("{who} both reads and posts message {msg:?}"));
        }
    }
    for var in function.read_only.iter().chain(&function.read_write) {
        if !agent.has_var(var) {
            findings.push(format!("{who} accesses undeclared variable {var:?}"));
        }
    }
    for var in &function.read_only {
        if function.read_write.contains(var) {
            findings.push(format!(
                "{who} lists variable {var:?} as both read-only and read-write"
            ));
        }
    }
    if let Some(condition) = &function.condition {
        validate_condition(model, agent, condition, &who, findings);
    }
}

fn validate_condition(
    model: &ModelDef,
    agent: &AgentDef,
    condition: &Condition,
    who: &str,
    findings: &mut Vec<String>,
) {
    let mut vars = BTreeSet::new();
    condition.read_vars(&mut vars);
    for var in vars {
        if !agent.has_var(&var) {
            findings.push(format!(
                "{who} has a condition on undeclared variable {var:?}"
            ));
        }
    }
    check_time_units(model, condition, who, findings);
}

fn check_time_units(
    model: &ModelDef,
    condition: &Condition,
    who: &str,
    findings: &mut Vec<String>,
) {
    match condition {
        Condition::Time { unit, .. } => {
            if !model.has_time_unit(unit) {
                findings.push(format!(
                    "{who} has a time condition on undeclared time unit {unit:?}"
                ));
            }
        }
        Condition::Not(inner) => check_time_units(model, inner, who, findings),
        Condition::Compare { .. } => {}
        Condition::Nested { lhs, rhs, .. } => {
            check_time_units(model, lhs, who, findings);
            check_time_units(model, rhs, who, findings);
        }
    }
}

/// Exactly one state must have no incoming function edge.
fn check_start_state(agent: &AgentDef, findings: &mut Vec<String>) {
    let currents: BTreeSet<&str> = agent
        .functions
        .iter()
        .map(|f| f.current_state.as_str())
        .collect();
    let nexts: BTreeSet<&str> = agent
        .functions
        .iter()
        .map(|f| f.next_state.as_str())
        .collect();
    let starts: Vec<&str> = currents.difference(&nexts).copied().collect();
    match starts.len() {
        0 => findings.push(format!(
            "agent {:?} has no start state (every state has an incoming function)",
            agent.name
        )),
        1 => {}
        _ => findings.push(format!(
            "agent {:?} has more than one start state: {}",
            agent.name,
            starts.join(", ")
        )),
    }
}

/// Every function leaving a state with more than one outgoing function must
/// carry a precondition.  The finding names the functions and the variables
/// they write, so an unconditional double write of `x` is reported against
/// `x`.
fn check_conditional_states(agent: &AgentDef, findings: &mut Vec<String>) {
    let states: BTreeSet<&str> = agent
        .functions
        .iter()
        .map(|f| f.current_state.as_str())
        .collect();
    for state in states {
        let leaving: Vec<&FunctionDef> = agent
            .functions
            .iter()
            .filter(|f| f.current_state == state)
            .collect();
        if leaving.len() < 2 {
            continue;
        }
        for function in leaving {
            if function.condition.is_none() {
                let (_, read_write) = agent.access_of(function);
                findings.push(format!(
                    "function {:?} leaves conditional state {:?} of agent {:?} without a \
                     condition; its writes ({}) would conflict on the same path",
                    function.name,
                    state,
                    agent.name,
                    read_write.join(", ")
                ));
            }
        }
    }
}

fn check_duplicates<'a>(
    names: impl Iterator<Item = &'a str>,
    what: &str,
    findings: &mut Vec<String>,
) {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            findings.push(format!("duplicate {what} name {name:?}"));
        }
    }
}
