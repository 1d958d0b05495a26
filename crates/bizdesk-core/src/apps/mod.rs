//! App catalog
//!
//! An app is a fixed set of specialists, each owning one tool server, plus
//! the routing policy the supervisor applies to pick between them. The
//! definitions are static so the supervisor and pipeline hold only
//! `&'static` references.

use bizdesk_store::AppKind;

use crate::tools::ToolServer;

pub mod ecommerce;
pub mod finance;
pub mod fusion;
pub mod hospital;
pub mod hr;
pub mod loan;

/// How the supervisor asks the LLM for a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    /// One `transfer_to_<name>` tool per specialist; the first call wins
    Handoff,
    /// A capped completion that must name exactly one specialist
    Label,
    /// No LLM, keyword scoring only
    Keyword,
}

impl RoutingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handoff => "llm_handoff",
            Self::Label => "llm_label",
            Self::Keyword => "keyword",
        }
    }
}

/// Keyword scoring policy over the lowercased last user text
#[derive(Debug, Clone, Copy)]
pub enum Scoring {
    /// Highest non-zero hit count; ties go to the earlier specialist
    MostHits,
    /// Highest hit count only when exactly one specialist has it
    UniqueMostHits,
    /// Any strong phrase wins immediately, in specialist order; otherwise the
    /// strictly greatest soft count, when it reaches `min_soft`
    StrongThenSoft { min_soft: usize },
    /// App-specific heuristic returning a specialist id
    Custom(fn(&str) -> Option<&'static str>),
}

/// One routable specialist
#[derive(Debug)]
pub struct SpecialistDef {
    /// Stable id, e.g. `job_agent`
    pub id: &'static str,
    /// Display name used in traces and UIs
    pub label: &'static str,
    /// Handoff tool description shown to the supervisor
    pub summary: &'static str,
    pub prompt: &'static str,
    pub server: &'static ToolServer,
    /// Soft keywords (or the only keywords for plain scoring)
    pub keywords: &'static [&'static str],
    pub strong: &'static [&'static str],
}

impl SpecialistDef {
    /// Handoff tool name: `job_agent` becomes `transfer_to_job`
    pub fn handoff_tool(&self) -> String {
        format!("transfer_to_{}", self.id.trim_end_matches("_agent"))
    }
}

/// What answers when no specialist is chosen
#[derive(Debug, Clone, Copy)]
pub enum Fallback {
    /// A fixed guidance reply
    Static {
        id: &'static str,
        summary: &'static str,
        reply: &'static str,
    },
    /// A short tool-less LLM answer
    General {
        id: &'static str,
        prompt: &'static str,
        guidance: &'static str,
        min_chars: usize,
        max_tokens: u32,
    },
}

impl Fallback {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Static { id, .. } | Self::General { id, .. } => id,
        }
    }
}

#[derive(Debug)]
pub struct AppDefinition {
    pub kind: AppKind,
    pub title: &'static str,
    pub supervisor_prompt: &'static str,
    pub mode: RoutingMode,
    /// Try a unique keyword winner before calling the LLM
    pub keyword_first: bool,
    pub scoring: Scoring,
    pub specialists: &'static [SpecialistDef],
    pub fallback: Fallback,
    /// Expose a handoff tool for the fallback itself
    pub fallback_handoff: bool,
    /// Conversational messages the supervisor sees
    pub supervisor_context: usize,
    /// Conversational messages a specialist sees
    pub specialist_context: usize,
}

impl AppDefinition {
    pub fn specialist(&self, id: &str) -> Option<&'static SpecialistDef> {
        self.specialists.iter().find(|s| s.id == id)
    }

    pub fn specialist_ids(&self) -> Vec<&'static str> {
        self.specialists.iter().map(|s| s.id).collect()
    }

    pub fn servers(&self) -> impl Iterator<Item = &'static ToolServer> {
        self.specialists.iter().map(|s| s.server)
    }
}

/// Every app, in [`AppKind::ALL`] order
pub static APPS: [&AppDefinition; 6] = [
    &ecommerce::APP,
    &finance::APP,
    &hr::APP,
    &loan::APP,
    &fusion::APP,
    &hospital::APP,
];

pub fn app(kind: AppKind) -> &'static AppDefinition {
    match kind {
        AppKind::Ecommerce => &ecommerce::APP,
        AppKind::Finance => &finance::APP,
        AppKind::Hr => &hr::APP,
        AppKind::Loan => &loan::APP,
        AppKind::Fusion => &fusion::APP,
        AppKind::Hospital => &hospital::APP,
    }
}

/// Look up a tool server by its name across all apps
pub fn server(name: &str) -> Option<&'static ToolServer> {
    APPS.iter().flat_map(|a| a.servers()).find(|s| s.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_is_consistent() {
        for (def, kind) in APPS.iter().zip(AppKind::ALL) {
            assert_eq!(def.kind, kind);
            assert!(!def.specialists.is_empty());
            let ids: HashSet<_> = def.specialist_ids().into_iter().collect();
            assert_eq!(ids.len(), def.specialists.len(), "duplicate id in {}", def.title);
            assert!(!ids.contains(def.fallback.id()));
            for s in def.specialists {
                assert!(!s.server.tools.is_empty(), "{} has no tools", s.id);
            }
        }
    }

    #[test]
    fn test_tool_names_unique_within_app() {
        for def in APPS {
            let mut seen = HashSet::new();
            for server in def.servers() {
                for tool in server.tools {
                    assert!(seen.insert(tool.name), "{} repeated in {}", tool.name, def.title);
                }
            }
        }
    }

    #[test]
    fn test_handoff_names_and_lookup() {
        let hr = app(AppKind::Hr);
        assert_eq!(hr.specialist("job_agent").unwrap().handoff_tool(), "transfer_to_job");
        assert!(hr.specialist("nobody").is_none());
        assert_eq!(server("MathServer").unwrap().name, "MathServer");
        assert_eq!(server("WardServer").unwrap().tools.len(), 7);
        assert!(server("NoSuchServer").is_none());
    }
}
