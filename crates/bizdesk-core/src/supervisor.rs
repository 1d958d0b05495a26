//! Supervisor routing
//!
//! Maps the latest user turn to one specialist of an app. The LLM is asked
//! first (tool-call handoff or a single-token label, depending on the app);
//! any provider error or unusable answer degrades to keyword scoring, and
//! keyword scoring degrades to the app's fallback. The supervisor keeps no
//! state between calls.

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::apps::{AppDefinition, Fallback, RoutingMode, Scoring, SpecialistDef};
use crate::providers::{ChatMessage, ChatRole, LlmProvider};
use crate::tools::ToolDefinition;

/// Completion budget for label classification
const LABEL_MAX_TOKENS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMethod {
    Llm,
    Keyword,
    Default,
}

impl RouteMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Keyword => "keyword",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    Specialist(&'static str),
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDecision {
    pub target: RouteTarget,
    pub method: RouteMethod,
}

impl RouteDecision {
    fn specialist(id: &'static str, method: RouteMethod) -> Self {
        Self {
            target: RouteTarget::Specialist(id),
            method,
        }
    }

    fn fallback(method: RouteMethod) -> Self {
        Self {
            target: RouteTarget::Fallback,
            method,
        }
    }

    /// Id of the chosen specialist or of the app's fallback
    pub fn target_id(&self, app: &AppDefinition) -> &'static str {
        match self.target {
            RouteTarget::Specialist(id) => id,
            RouteTarget::Fallback => app.fallback.id(),
        }
    }
}

/// Lowercased text of the last user turn
pub fn last_user_text(turns: &[ChatMessage]) -> String {
    turns
        .iter()
        .rev()
        .find(|m| m.role == ChatRole::User && !m.has_tool_blocks())
        .map(|m| m.text().trim().to_lowercase())
        .unwrap_or_default()
}

/// Conversational turns only, at most `max` of them.
///
/// Tool traffic is dropped; assistant text riding along with tool calls is
/// kept as plain text. System turns (the memory preamble) are always kept.
pub fn conversation_context(turns: &[ChatMessage], max: usize) -> Vec<ChatMessage> {
    let mut system = Vec::new();
    let mut chat = Vec::new();
    for turn in turns {
        if turn.role == ChatRole::System {
            system.push(turn.clone());
            continue;
        }
        if !turn.has_tool_blocks() {
            chat.push(turn.clone());
            continue;
        }
        let text = turn.text();
        if turn.role == ChatRole::Assistant && !text.trim().is_empty() {
            chat.push(ChatMessage::assistant(text));
        }
    }
    if max > 0 && chat.len() > max {
        chat.drain(..chat.len() - max);
    }
    system.extend(chat);
    system
}

fn count_hits(keywords: &[&str], text: &str) -> usize {
    keywords.iter().filter(|k| text.contains(*k)).count()
}

impl Scoring {
    /// Pick a specialist for `text` (already lowercased), if any scores
    pub fn pick(&self, specialists: &'static [SpecialistDef], text: &str) -> Option<&'static str> {
        if text.trim().is_empty() {
            return None;
        }
        match self {
            Scoring::MostHits => {
                let mut best: Option<(&'static str, usize)> = None;
                for s in specialists {
                    let hits = count_hits(s.keywords, text);
                    if hits > 0 && best.is_none_or(|(_, b)| hits > b) {
                        best = Some((s.id, hits));
                    }
                }
                best.map(|(id, _)| id)
            }
            Scoring::UniqueMostHits => {
                let scores: Vec<(&'static str, usize)> = specialists
                    .iter()
                    .map(|s| (s.id, count_hits(s.keywords, text)))
                    .filter(|(_, hits)| *hits > 0)
                    .collect();
                let top = scores.iter().map(|(_, h)| *h).max()?;
                let mut winners = scores.iter().filter(|(_, h)| *h == top);
                match (winners.next(), winners.next()) {
                    (Some((id, _)), None) => Some(*id),
                    _ => None,
                }
            }
            Scoring::StrongThenSoft { min_soft } => {
                let mut best: Option<&'static str> = None;
                let mut best_hits = 0;
                for s in specialists {
                    if s.strong.iter().any(|k| text.contains(k)) {
                        return Some(s.id);
                    }
                    let hits = count_hits(s.keywords, text);
                    if hits > best_hits {
                        best_hits = hits;
                        best = Some(s.id);
                    }
                }
                best.filter(|_| best_hits >= *min_soft)
            }
            Scoring::Custom(f) => f(text),
        }
    }
}

pub struct Supervisor {
    app: &'static AppDefinition,
    provider: Arc<dyn LlmProvider>,
}

impl Supervisor {
    pub fn new(app: &'static AppDefinition, provider: Arc<dyn LlmProvider>) -> Self {
        Self { app, provider }
    }

    pub fn app(&self) -> &'static AppDefinition {
        self.app
    }

    /// Handoff tools offered to the LLM in [`RoutingMode::Handoff`]
    pub fn handoff_tools(&self) -> Vec<ToolDefinition> {
        let empty = json!({"type": "object", "properties": {}, "required": []});
        let mut tools: Vec<ToolDefinition> = self
            .app
            .specialists
            .iter()
            .map(|s| ToolDefinition {
                name: s.handoff_tool(),
                description: s.summary.to_string(),
                input_schema: empty.clone(),
            })
            .collect();
        if let (true, Fallback::Static { id, summary, .. }) =
            (self.app.fallback_handoff, self.app.fallback)
        {
            tools.push(ToolDefinition {
                name: format!("transfer_to_{}", id),
                description: summary.to_string(),
                input_schema: empty,
            });
        }
        tools
    }

    pub async fn route(&self, turns: &[ChatMessage]) -> RouteDecision {
        let text = last_user_text(turns);
        let scoring = self.app.scoring;

        if self.app.keyword_first
            && let Some(id) = Scoring::UniqueMostHits.pick(self.app.specialists, &text)
        {
            info!("{}: fast keyword route to {}", self.app.title, id);
            return RouteDecision::specialist(id, RouteMethod::Keyword);
        }

        let llm = match self.app.mode {
            RoutingMode::Handoff => self.route_by_handoff(turns).await,
            RoutingMode::Label => self.route_by_label(turns).await,
            RoutingMode::Keyword => None,
        };
        if let Some(decision) = llm {
            info!(
                "{}: routed to {} by llm",
                self.app.title,
                decision.target_id(self.app)
            );
            return decision;
        }

        match scoring.pick(self.app.specialists, &text) {
            Some(id) => {
                if self.app.mode != RoutingMode::Keyword {
                    warn!("{}: no usable llm route, keyword match {}", self.app.title, id);
                } else {
                    info!("{}: keyword route to {}", self.app.title, id);
                }
                RouteDecision::specialist(id, RouteMethod::Keyword)
            }
            None => {
                info!(
                    "{}: no specialist matched, using {}",
                    self.app.title,
                    self.app.fallback.id()
                );
                RouteDecision::fallback(RouteMethod::Default)
            }
        }
    }

    async fn route_by_handoff(&self, turns: &[ChatMessage]) -> Option<RouteDecision> {
        let context = conversation_context(turns, self.app.supervisor_context);
        let tools = self.handoff_tools();
        let response = match self
            .provider
            .chat(&context, &tools, self.app.supervisor_prompt)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("{}: supervisor llm failed: {}", self.app.title, e);
                return None;
            }
        };

        let (_, name, _) = response.tool_calls().next()?;
        debug!("{}: handoff call {}", self.app.title, name);
        if let Some(s) = self.app.specialists.iter().find(|s| s.handoff_tool() == name) {
            return Some(RouteDecision::specialist(s.id, RouteMethod::Llm));
        }
        if self.app.fallback_handoff && name == format!("transfer_to_{}", self.app.fallback.id()) {
            return Some(RouteDecision::fallback(RouteMethod::Llm));
        }
        warn!("{}: unknown handoff tool {}", self.app.title, name);
        None
    }

    async fn route_by_label(&self, turns: &[ChatMessage]) -> Option<RouteDecision> {
        let context = conversation_context(turns, self.app.supervisor_context);
        let response = match self
            .provider
            .chat_capped(&context, &[], self.app.supervisor_prompt, LABEL_MAX_TOKENS)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("{}: supervisor llm failed: {}", self.app.title, e);
                return None;
            }
        };

        let label = response.text().trim().to_lowercase();
        debug!("{}: label '{}'", self.app.title, label);
        let chosen = self
            .app
            .specialists
            .iter()
            .find(|s| label.contains(s.id))
            .map(|s| RouteDecision::specialist(s.id, RouteMethod::Llm));
        if chosen.is_none() {
            warn!("{}: unrecognised label '{}'", self.app.title, label);
        }
        chosen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::{ecommerce, finance, fusion, hospital, hr, loan};
    use crate::providers::{ScriptedProvider, Step};
    use serde_json::json;

    fn supervisor(app: &'static AppDefinition, steps: Vec<Step>) -> (Supervisor, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::new(steps));
        (Supervisor::new(app, provider.clone()), provider)
    }

    fn ask(text: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::user(text)]
    }

    #[tokio::test]
    async fn test_handoff_route() {
        let (sup, provider) = supervisor(&hr::APP, vec![Step::tool_call("transfer_to_offer", json!({}))]);
        let decision = sup.route(&ask("draft an offer for candidate 3")).await;
        assert_eq!(decision.target, RouteTarget::Specialist("offer_agent"));
        assert_eq!(decision.method, RouteMethod::Llm);

        let call = &provider.calls()[0];
        assert_eq!(call.tools.len(), 8);
        assert!(call.tools.contains(&"transfer_to_default_answer".to_string()));
    }

    #[tokio::test]
    async fn test_handoff_to_default_answer() {
        let (sup, _) = supervisor(&hr::APP, vec![Step::tool_call("transfer_to_default_answer", json!({}))]);
        let decision = sup.route(&ask("hmm")).await;
        assert_eq!(decision.target, RouteTarget::Fallback);
        assert_eq!(decision.target_id(&hr::APP), "default_answer");
    }

    #[tokio::test]
    async fn test_llm_failure_degrades_to_keywords() {
        let (sup, _) = supervisor(&hr::APP, vec![Step::fail("connection refused")]);
        let decision = sup.route(&ask("Show the hiring pipeline report")).await;
        assert_eq!(decision.target, RouteTarget::Specialist("analytics_agent"));
        assert_eq!(decision.method, RouteMethod::Keyword);

        let (sup, _) = supervisor(&hr::APP, vec![Step::text("not sure")]);
        let decision = sup.route(&ask("good morning")).await;
        assert_eq!(decision, RouteDecision::fallback(RouteMethod::Default));
    }

    #[tokio::test]
    async fn test_label_route() {
        let (sup, provider) = supervisor(&loan::APP, vec![Step::text(" KYC_AGENT\n")]);
        let decision = sup.route(&ask("run AML for priya")).await;
        assert_eq!(decision.target, RouteTarget::Specialist("kyc_agent"));
        assert_eq!(provider.calls()[0].max_tokens, Some(LABEL_MAX_TOKENS));

        let (sup, _) = supervisor(&loan::APP, vec![Step::text("banana")]);
        let decision = sup.route(&ask("record a payment of 16000 on loan 1")).await;
        assert_eq!(decision.target, RouteTarget::Specialist("repayment_agent"));
        assert_eq!(decision.method, RouteMethod::Keyword);
    }

    #[tokio::test]
    async fn test_fusion_label_and_heuristic() {
        let (sup, _) = supervisor(&fusion::APP, vec![Step::text("math_agent")]);
        assert_eq!(
            sup.route(&ask("what is 40% of 250")).await.target,
            RouteTarget::Specialist("math_agent")
        );
        let (sup, _) = supervisor(&fusion::APP, vec![Step::fail("timeout")]);
        assert_eq!(
            sup.route(&ask("count rows in the news table")).await.target,
            RouteTarget::Specialist("database_agent")
        );
    }

    #[tokio::test]
    async fn test_keyword_only_app_never_calls_llm() {
        let (sup, provider) = supervisor(&finance::APP, vec![]);
        let decision = sup.route(&ask("Show me the trial balance")).await;
        assert_eq!(decision.target, RouteTarget::Specialist("gl_agent"));

        let decision = sup.route(&ask("what is the budget")).await;
        assert_eq!(decision.target, RouteTarget::Fallback);
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fast_keyword_path() {
        let (sup, provider) = supervisor(&ecommerce::APP, vec![Step::text("")]);
        let decision = sup.route(&ask("I want a refund for a damaged item")).await;
        assert_eq!(decision.target, RouteTarget::Specialist("returns_agent"));
        assert!(provider.calls().is_empty());

        // order and loyalty tie, so the LLM decides; it declines to hand off
        let decision = sup.route(&ask("order points")).await;
        assert_eq!(decision.target, RouteTarget::Fallback);
        assert_eq!(provider.calls().len(), 1);
    }

    #[test]
    fn test_scoring_rules() {
        let specialists = finance::APP.specialists;
        let rule = Scoring::StrongThenSoft { min_soft: 2 };
        assert_eq!(rule.pick(specialists, "budget variance for q1"), Some("budget_agent"));
        assert_eq!(rule.pick(specialists, "forecast and overspend"), Some("budget_agent"));
        assert_eq!(rule.pick(specialists, "forecast"), None);
        assert_eq!(rule.pick(specialists, "show the income statement"), Some("pl_agent"));
        assert_eq!(rule.pick(specialists, "is the balance sheet balanced"), Some("bs_agent"));
        assert_eq!(rule.pick(specialists, "ap aging and burn rate"), Some("cash_agent"));
        assert_eq!(rule.pick(specialists, "kpi benchmark for feb"), Some("kpi_agent"));
        assert_eq!(rule.pick(specialists, "prepare the board pack"), Some("report_agent"));
        assert_eq!(rule.pick(specialists, ""), None);

        // ties keep the earlier specialist
        assert_eq!(Scoring::MostHits.pick(hr::APP.specialists, "job candidate"), Some("job_agent"));

        let shop = ecommerce::APP.specialists;
        let unique = Scoring::UniqueMostHits;
        assert_eq!(unique.pick(shop, "is the jbl speaker back in stock"), Some("product_agent"));
        assert_eq!(unique.pick(shop, "i was charged twice, send the invoice"), Some("payment_agent"));
        assert_eq!(unique.pick(shop, "i want to escalate my complaint"), Some("complaints_agent"));
        assert_eq!(unique.pick(shop, "order points"), None);

        let desk = hospital::APP.specialists;
        let most = Scoring::MostHits;
        assert_eq!(most.pick(desk, "book an appointment with a doctor"), Some("appointment_agent"));
        assert_eq!(most.pick(desk, "we are short of gloves, reorder stock"), Some("inventory_agent"));
        assert_eq!(most.pick(desk, "is there a drug interaction with warfarin"), Some("pharmacy_agent"));
        assert_eq!(most.pick(desk, "the potassium lab result came back"), Some("lab_agent"));
        assert_eq!(most.pick(desk, "discharge the patient from bed gw-02"), Some("ward_agent"));
        assert_eq!(most.pick(desk, "hello there"), None);
    }

    #[test]
    fn test_conversation_context() {
        use crate::providers::{ChatBlock, ChatMessageContent};
        let turns = vec![
            ChatMessage::system("Earlier: asked about order 7"),
            ChatMessage::user("one"),
            ChatMessage {
                role: ChatRole::Assistant,
                content: ChatMessageContent::Blocks(vec![ChatBlock::ToolCall {
                    id: "c".into(),
                    name: "get_order_status".into(),
                    input: json!({}),
                }]),
            },
            ChatMessage::assistant("two"),
            ChatMessage::user("three"),
        ];
        let ctx = conversation_context(&turns, 2);
        let texts: Vec<String> = ctx.iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["Earlier: asked about order 7", "two", "three"]);
        assert_eq!(last_user_text(&turns), "three");
    }
}
