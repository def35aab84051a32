//! The top-level task loop: observe page state, consult the model, execute
//! the extracted action, feed the outcome back, repeat within a fixed
//! iteration budget.

use anyhow::Result;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::content;
use crate::driver::{ChromeDriver, PageDriver};
use crate::error::AgentError;
use crate::invoker::ModelInvoker;
use crate::metrics::RunMetrics;
use crate::parser;
use crate::provider::build_provider;
use crate::types::{ActionDirective, ActionKind, ChatMessage, ExecutionOutcome, ParsedResponse, Task};

const PLANNING_TEMPERATURE: f32 = 0.2;
const GENERATION_TEMPERATURE: f32 = 0.7;

const CONTENT_SYSTEM_PROMPT: &str = r#"You are an intelligent web assistant that helps users extract and summarize information from websites.
Your goal is to navigate through pages, locate relevant information, and compile it into well-structured content.

For each step, you will:
1. Analyze the current webpage structure and content
2. Determine the most relevant information related to the user's request
3. Navigate to new pages if necessary to gather more information
4. Provide clear, structured actions in JSON format

Respond with actions in this format:
```json
{
"type": "click|input|select|navigate|collect",
"target": "<css_selector_or_url>",
"value": "<value_for_input>" (for input/select actions only)
}
```

The "collect" action doesn't require a target and collects content from the current page.
For "navigate" actions, specify a full URL as the target, or "back" to go back.

Once you have all the necessary information, respond with:
```
TASK COMPLETE
Result: <summary of your findings>
```

Be efficient, accurate, and focus on delivering high-quality information that addresses the user's specific needs."#;

const TASK_SYSTEM_PROMPT: &str = r##"You are an intelligent web assistant that helps users accomplish tasks on websites.
Your goal is to help navigate and interact with web interfaces to complete specific objectives.

For each step, you will:
1. Analyze the current webpage structure and interface elements
2. Determine the most logical next action based on the task goal
3. Provide clear, structured actions in JSON format

Respond with actions in this format:
```json
{
"type": "click|input|select|navigate",
"target": "<css_selector_or_xpath>",
"value": "<value_for_input>" (for input/select actions only)
}
```

For element identifiers, use:
- CSS selectors (e.g., "#submit-button", ".nav-link")
- XPath expressions (prefixed with "xpath=")
- Text content directly when appropriate

For navigation actions, use "navigate" as the type and provide the full URL as the target, or "back" to go back.

Once the task is complete, respond with:
```
TASK COMPLETE
Result: <description of what was accomplished>
```

Be efficient, precise, and reliable in completing the user's task."##;

const CORRECTIVE_PROMPT: &str = "I need a clear action to take. Please provide a specific \
    instruction in JSON format with 'type' and 'target' fields.";

pub struct TaskAgent<D: PageDriver = ChromeDriver> {
    driver: D,
    invoker: ModelInvoker,
    config: AgentConfig,
}

impl TaskAgent<ChromeDriver> {
    pub fn launch(config: AgentConfig) -> Result<Self> {
        let driver = ChromeDriver::launch(config.timeout)?;
        let invoker = ModelInvoker::new(build_provider(&config), config.max_retries);
        Ok(Self::new(driver, invoker, config))
    }
}

impl<D: PageDriver> TaskAgent<D> {
    pub fn new(driver: D, invoker: ModelInvoker, config: AgentConfig) -> Self {
        Self {
            driver,
            invoker,
            config,
        }
    }

    /// Run one task to completion. Failure is communicated solely through the
    /// returned metrics record (`success` flag and `errors` list); even total
    /// model failure is absorbed into a failed run rather than surfaced as an
    /// error.
    pub async fn execute_task(&mut self, objective: &str, url: &str) -> RunMetrics {
        let task = Task::classify(objective, url);
        let mut metrics = RunMetrics::new(&task.objective, &task.url, task.is_content_generation);
        info!(
            task = task.objective,
            url = task.url,
            content_generation = task.is_content_generation,
            "starting task"
        );

        // Initial navigation is the only fatal failure mode.
        if !self.enter_page(&task, url, &mut metrics, true) {
            metrics.finalize();
            return metrics;
        }

        // Simple content tasks can be answered from what navigation already
        // collected, without entering the planning loop at all.
        if task.is_content_generation && task.is_simple_content {
            info!("simple content task, generating directly");
            let generated = self.generate_content(&task, &mut metrics).await;
            metrics.result = Some(generated.clone());
            metrics.generated_content = Some(generated);
            metrics.success = true;
            metrics.finalize();
            return metrics;
        }

        let mut conversation = vec![
            ChatMessage::system(if task.is_content_generation {
                CONTENT_SYSTEM_PROMPT
            } else {
                TASK_SYSTEM_PROMPT
            }),
            ChatMessage::user(format!(
                "I need to perform this task on a website: {}\n\n\
                 The website URL is: {}\n\n\
                 Please guide me through completing this step by step.",
                task.objective, task.url
            )),
        ];

        for iteration in 0..self.config.max_iterations {
            info!(
                iteration = iteration + 1,
                max = self.config.max_iterations,
                "planning turn"
            );

            match self.driver.observe() {
                Ok(observation) => {
                    metrics.interactive_elements_count = observation.interactive_elements_count;
                    conversation.push(ChatMessage::user(observation.to_message()));
                }
                Err(e) => {
                    warn!(error = %e, "observation failed");
                    conversation.push(ChatMessage::user(format!(
                        "The current page state could not be read ({e}). \
                         Decide the next action from the conversation so far."
                    )));
                }
            }

            let reply = self
                .invoker
                .invoke(&conversation, PLANNING_TEMPERATURE, &mut metrics)
                .await;
            conversation.push(ChatMessage::assistant(reply.clone()));

            match parser::parse(&reply) {
                ParsedResponse::Completed { result } => {
                    metrics.success = true;
                    if task.is_content_generation {
                        let generated = self.generate_content(&task, &mut metrics).await;
                        metrics.result = Some(generated.clone());
                        metrics.generated_content = Some(generated);
                    } else {
                        metrics.result = Some(result);
                    }
                    info!("task completed");
                    break;
                }
                ParsedResponse::Directive(directive) => {
                    metrics.record_action(&directive);
                    let outcome = self.act(&task, &directive, &mut metrics).await;
                    conversation.push(ChatMessage::user(acknowledge(&directive, &outcome)));
                }
                ParsedResponse::Unparsed => {
                    conversation.push(ChatMessage::user(CORRECTIVE_PROMPT));
                }
            }
        }

        if !metrics.success {
            metrics.record_error(AgentError::BudgetExhausted.to_string());
            warn!("iteration budget exhausted");
            // Content-generation tasks are salvaged into a best-effort answer
            // built from whatever was collected.
            if task.is_content_generation {
                let generated = self.generate_content(&task, &mut metrics).await;
                metrics.result = Some(format!("[INCOMPLETE] {generated}"));
                metrics.generated_content = Some(generated);
                metrics.success = true;
            }
        }

        metrics.finalize();
        metrics
    }

    /// Dispatch one directive. Collect and navigate stay here; element
    /// actions go through the driver and the resolution cascade.
    async fn act(
        &mut self,
        task: &Task,
        directive: &ActionDirective,
        metrics: &mut RunMetrics,
    ) -> ExecutionOutcome {
        match directive.kind {
            ActionKind::Collect => {
                self.collect_into(metrics);
                ExecutionOutcome::ok()
            }
            ActionKind::Navigate => {
                let target = directive.target.as_deref().unwrap_or_default();
                if target == "back" {
                    match self.driver.back() {
                        Ok(()) => ExecutionOutcome::ok(),
                        Err(e) => ExecutionOutcome::failed(e.to_string()),
                    }
                } else if target.starts_with("http") {
                    if self.enter_page(task, target, metrics, false) {
                        ExecutionOutcome::ok()
                    } else {
                        ExecutionOutcome::failed(format!("could not load {target}"))
                    }
                } else {
                    ExecutionOutcome::failed(format!("navigate target {target:?} is not a URL"))
                }
            }
            _ => {
                let outcome = self.driver.execute(directive, metrics);
                // Clicks on content-generation runs usually change the page;
                // re-collect so the material isn't lost.
                if outcome.succeeded
                    && directive.kind == ActionKind::Click
                    && task.is_content_generation
                {
                    self.collect_into(metrics);
                }
                outcome
            }
        }
    }

    /// Load a page, record load/detection telemetry, and collect content for
    /// content-generation tasks. `fatal` marks the run-opening navigation.
    /// Load telemetry always reflects the most recent navigation.
    fn enter_page(
        &mut self,
        task: &Task,
        url: &str,
        metrics: &mut RunMetrics,
        fatal: bool,
    ) -> bool {
        match self.driver.open(url) {
            Ok(load_secs) => {
                metrics.page_load_secs = Some(load_secs);
                let (enhanced, detection_secs) = self.driver.detect_annotations();
                if fatal {
                    metrics.has_semantic_annotations = enhanced;
                    metrics.detection_secs = Some(detection_secs);
                }
                if task.is_content_generation {
                    self.collect_into(metrics);
                }
                true
            }
            Err(e) => {
                let error = AgentError::Navigation(e.to_string()).to_string();
                metrics.record_error(error);
                warn!(url, error = %e, "navigation failed");
                false
            }
        }
    }

    fn collect_into(&mut self, metrics: &mut RunMetrics) {
        match self.driver.collect() {
            Ok(block) => {
                metrics.collected_content.push_str(&block);
                metrics.collected_content.push_str(content::BLOCK_SEPARATOR);
            }
            Err(e) => {
                warn!(error = %e, "content collection failed");
                metrics.record_error(AgentError::ContentGeneration(e.to_string()).to_string());
            }
        }
    }

    /// Final content generation from everything collected so far. An empty
    /// collection is stated explicitly rather than sent as a blank block.
    async fn generate_content(&self, task: &Task, metrics: &mut RunMetrics) -> String {
        let collected = if metrics.collected_content.trim().is_empty() {
            "(no content was collected from the website)".to_string()
        } else {
            metrics.collected_content.clone()
        };
        let turns = vec![
            ChatMessage::system(
                "You are a helpful assistant that generates high-quality content \
                 based on information from websites.",
            ),
            ChatMessage::user(format!(
                "Task: {}\n\n\
                 Please generate content based on the following information collected \
                 from the website. Make sure your response is well-structured, accurate, \
                 and directly addresses the task.\n\n\
                 COLLECTED INFORMATION:\n{}\n\n\
                 Generate a detailed, well-formatted response that fulfills the task \
                 requirements.",
                task.objective, collected
            )),
        ];
        self.invoker
            .invoke(&turns, GENERATION_TEMPERATURE, metrics)
            .await
    }
}

/// The acknowledgment message appended to the conversation after an action.
fn acknowledge(directive: &ActionDirective, outcome: &ExecutionOutcome) -> String {
    if outcome.succeeded {
        format!("Action completed: {}", directive.describe())
    } else {
        format!(
            "Unable to perform the action: {}. The element might not be visible, \
             clickable, or may not exist. Please try a different approach.",
            directive.describe()
        )
    }
}
