//! Database and math assistant

use bizdesk_store::AppKind;
use regex::Regex;
use std::sync::LazyLock;

use super::{AppDefinition, Fallback, RoutingMode, Scoring, SpecialistDef};
use crate::tools::fusion::{DATABASE_SERVER, MATH_SERVER};

const DATABASE_KEYWORDS: &[&str] = &[
    "database", "postgres", "postgresql", "sql", "schema", "table", "query", "users", "orders",
    "news", "rows", "records",
];

const MATH_KEYWORDS: &[&str] = &[
    "math", "mathematics", "calculate", "calculation", "add", "sum", "plus", "subtract", "minus",
    "multiply", "product", "divide", "percentage", "percent", "power", "square", "cube",
];

const WORD_PROBLEM_KEYWORDS: &[&str] = &[
    "remaining", "remain", "left", "after", "gave", "give", "take", "took", "minus", "less",
    "more", "total",
];

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid regex"));

static OPERATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[+\-*/^]").expect("valid regex"));

/// Heuristic route. Database keywords win, then anything that looks numeric.
pub fn infer_route(text: &str) -> Option<&'static str> {
    let text = text.to_lowercase();
    if DATABASE_KEYWORDS.iter().any(|k| text.contains(k)) {
        return Some("database_agent");
    }
    if MATH_KEYWORDS.iter().any(|k| text.contains(k)) {
        return Some("math_agent");
    }
    let numbers = NUMBER.find_iter(&text).count();
    if numbers > 0 && OPERATOR.is_match(&text) {
        return Some("math_agent");
    }
    if numbers > 0 && WORD_PROBLEM_KEYWORDS.iter().any(|k| text.contains(k)) {
        return Some("math_agent");
    }
    if numbers >= 2 {
        return Some("math_agent");
    }
    Some("database_agent")
}

const SUPERVISOR_PROMPT: &str = "\
You route requests between two agents: database_agent and math_agent. Reply with only one of \
those two tokens.
database_agent: SQL, tables, schema, records, the users, orders and news tables, joins, counts \
from the database.
math_agent: arithmetic, percentages, word problems about what is left or remaining, equations \
and other numeric reasoning.";

const DATABASE_PROMPT: &str = "\
You are a database assistant over a sandbox with the tables users(id, name, email, city, \
status, created_at), orders(id, user_id, product, amount, status, created_at) and \
news(id, title, category, author_id, published_at).
Build the statement with build_select_query, build_count_query or build_join_query, then run \
its query with execute_query.
- 'latest N rows' means order_by 'id desc' with limit N.
- To count matches across two tables, use build_join_query with columns ['COUNT(*) AS total'].
- Fill missing parameters with sensible defaults.";

const MATH_PROMPT: &str = "\
You are a math assistant. Pick the matching tool and call it directly.
- Arithmetic expressions go to math_evaluate_expression.
- 'x out of y' or a score percentage is math_percentage_from_total with obtained x and total y.
- 'N percent of a value' is math_percentage.
- Powers and exponents use math_power.";

pub static APP: AppDefinition = AppDefinition {
    kind: AppKind::Fusion,
    title: "Fusion DB + Math",
    supervisor_prompt: SUPERVISOR_PROMPT,
    mode: RoutingMode::Label,
    keyword_first: false,
    scoring: Scoring::Custom(infer_route),
    specialists: &[
        SpecialistDef {
            id: "database_agent",
            label: "Database",
            summary: "SQL over the sandbox tables.",
            prompt: DATABASE_PROMPT,
            server: &DATABASE_SERVER,
            keywords: DATABASE_KEYWORDS,
            strong: &[],
        },
        SpecialistDef {
            id: "math_agent",
            label: "Math",
            summary: "Arithmetic and percentages.",
            prompt: MATH_PROMPT,
            server: &MATH_SERVER,
            keywords: MATH_KEYWORDS,
            strong: &[],
        },
    ],
    fallback: Fallback::Static {
        id: "guidance",
        summary: "",
        reply: "Ask me about the users, orders or news tables, or give me a calculation.",
    },
    fallback_handoff: false,
    supervisor_context: 8,
    specialist_context: 10,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_route() {
        assert_eq!(infer_route("show the latest 5 orders"), Some("database_agent"));
        assert_eq!(infer_route("what is 12 * 7"), Some("math_agent"));
        assert_eq!(infer_route("I had 10 apples and gave 3 away, how many left"), Some("math_agent"));
        assert_eq!(infer_route("compare 4 and 9"), Some("math_agent"));
        assert_eq!(infer_route("hello there"), Some("database_agent"));
    }
}
