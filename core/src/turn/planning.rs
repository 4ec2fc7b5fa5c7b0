// Planning
use sage_protocol::Message;
use tracing::{debug, warn};

use crate::model::{ChatRequest, ModelClient};

const NO_PLAN: &str = "No plan needed";

#[derive(Debug, Clone, PartialEq)]
pub struct PlanningConfig {
  /// Prompt for the planner; `{prompt}` marks where the request goes.
  pub template: String,
  pub temperature: f32,
}

pub fn planning_prompt(template: &str, prompt: &str) -> String {
  if template.contains("{prompt}") {
    template.replace("{prompt}", prompt)
  } else {
    format!("{template}\n\nUser request: {prompt}")
  }
}

/// Trivial or declined plans are dropped.
pub fn accept_plan(plan: &str) -> Option<&str> {
  let plan = plan.trim();
  (plan.chars().count() > 5 && !plan.contains(NO_PLAN)).then_some(plan)
}

pub fn inject_plan(system_prompt: &str, plan: &str) -> String {
  format!(
    "{system_prompt}\n\n[APPROVED PLAN]\n{plan}\n\nInstruction: Follow the plan above step by step. Use tools to execute each step."
  )
}

/// One non-streaming planner call. Any failure means no plan.
pub async fn generate_plan(
  client: &ModelClient,
  config: &PlanningConfig,
  prompt: &str,
) -> Option<String> {
  let request = ChatRequest::new(vec![Message::user(planning_prompt(&config.template, prompt))])
    .with_temperature(config.temperature);

  match client.chat(request).await {
    Ok(response) => {
      let plan = accept_plan(response.text()).map(str::to_string);
      if plan.is_none() {
        debug!("planner declined to plan");
      }
      plan
    }
    Err(e) => {
      warn!(error = %e, "plan generation failed");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn template_placeholder_or_append() {
    assert_eq!(planning_prompt("Plan: {prompt}!", "chart sales"), "Plan: chart sales!");
    assert_eq!(
      planning_prompt("Make a plan.", "chart sales"),
      "Make a plan.\n\nUser request: chart sales"
    );
  }

  #[test]
  fn trivial_plans_are_rejected() {
    assert_eq!(accept_plan("  ok  "), None);
    assert_eq!(accept_plan("No plan needed."), None);
    assert_eq!(accept_plan("1. Read file\n"), Some("1. Read file"));
  }

  #[test]
  fn plan_is_appended_to_system_prompt() {
    assert_eq!(
      inject_plan("Be helpful.", "1. Read"),
      "Be helpful.\n\n[APPROVED PLAN]\n1. Read\n\nInstruction: Follow the plan above step by step. Use tools to execute each step."
    );
  }
}
