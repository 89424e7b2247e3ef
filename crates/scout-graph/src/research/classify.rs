use futures::future::BoxFuture;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use scout_core::error::Result;
use scout_llm::Completer;

use super::names::CLASSIFY_INTENT_AND_TOPIC;
use crate::node::Node;
use crate::state::{ExecutionState, Intent};

const RESEARCH_KEYWORDS: &[&str] = &[
    "教えて", "おしえて", "知りたい", "について", "とは", "調べて", "最新", "動向", "状況", "現状",
    "詳しく", "説明", "解説", "情報", "どんな", "どのような", "なぜ", "なんで", "どうして",
    "の話", "のこと", "に関して", "関連", "特徴", "概要", "紹介",
    "tell me", "about", "what is", "what are", "explain", "describe", "latest", "current",
    "how", "why", "where", "when", "who", "overview", "summary", "research", "investigate",
    "details", "information", "facts", "story", "background",
];

/// Matched as whole words so "hi" does not fire on "history".
const CHAT_WORDS: &[&str] = &[
    "hello", "hi", "hey", "thanks", "thank", "thx", "goodbye", "bye",
];

const CHAT_PHRASES: &[&str] = &[
    "こんにちは", "ありがとう", "よろしく", "さようなら", "おつかれ", "がんばって",
];

const QA_KEYWORDS: &[&str] = &[
    "何時", "what time", "今日", "today", "天気", "weather", "計算", "calculator", "+", "*", "=",
];

/// Subset of research keywords that upgrade a model's `qa` answer.
const QA_UPGRADE_KEYWORDS: &[&str] = &[
    "教えて", "おしえて", "知りたい", "について", "とは", "調べて", "最新", "動向", "状況", "現状",
    "詳しく", "説明", "解説", "tell me", "about", "what is", "explain", "latest", "current",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    pub topic: String,
}

/// Keyword pass: chat first, then simple Q&A, otherwise research on the whole input.
pub fn classify_by_keywords(input: &str) -> Classification {
    let lower = input.to_lowercase();

    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let is_chat = words.iter().any(|w| CHAT_WORDS.contains(w))
        || CHAT_PHRASES.iter().any(|p| lower.contains(p));
    if is_chat {
        return Classification {
            intent: Intent::Chat,
            topic: String::new(),
        };
    }

    if QA_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Classification {
            intent: Intent::Qa,
            topic: String::new(),
        };
    }

    if let Some(keyword) = RESEARCH_KEYWORDS.iter().find(|k| lower.contains(*k)) {
        debug!(keyword, "Research keyword matched");
    }
    Classification {
        intent: Intent::Research,
        topic: input.trim().to_string(),
    }
}

#[derive(Deserialize)]
struct ModelClassification {
    intent: String,
    #[serde(default)]
    topic: String,
}

fn parse_model_classification(response: &str) -> Option<Classification> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    let parsed: ModelClassification = serde_json::from_str(response.get(start..=end)?).ok()?;
    Some(Classification {
        intent: Intent::parse(&parsed.intent)?,
        topic: parsed.topic.trim().to_string(),
    })
}

fn classify_prompt(input: &str) -> String {
    format!(
        r#"Classify the intent of the user input below.

- "research": any request for explanations, overviews, recent developments or
  detailed information that would benefit from web search.
- "qa": only simple factual questions with a short answer (time, arithmetic,
  basic definitions).
- "chat": greetings, thanks and casual conversation.

User input: "{input}"

Respond with JSON only:
{{"intent": "research|qa|chat", "topic": "extracted topic or empty string"}}"#
    )
}

/// Sets `intent` and `topic`.
pub struct ClassifyNode {
    completer: Completer,
}

impl ClassifyNode {
    pub fn new(completer: Completer) -> Self {
        Self { completer }
    }

    async fn classify(&self, input: &str) -> Result<Classification> {
        let by_keywords = classify_by_keywords(input);
        if by_keywords.intent != Intent::Qa {
            return Ok(by_keywords);
        }

        // Ambiguous: ask the model, without streaming, for a JSON verdict.
        let response = self.completer.generate(&classify_prompt(input)).await?;
        let mut result = parse_model_classification(&response).unwrap_or_else(|| {
            warn!(response = %response, "Unparseable classification, using keyword result");
            by_keywords
        });

        if result.intent == Intent::Qa {
            let lower = input.to_lowercase();
            if QA_UPGRADE_KEYWORDS.iter().any(|k| lower.contains(k)) {
                result.intent = Intent::Research;
                if result.topic.is_empty() {
                    result.topic = input.trim().to_string();
                }
            }
        }
        Ok(result)
    }
}

impl Node for ClassifyNode {
    fn name(&self) -> &str {
        CLASSIFY_INTENT_AND_TOPIC
    }

    fn run<'a>(
        &'a self,
        _cancel: &'a CancellationToken,
        state: &'a ExecutionState,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let input = state.input();
            let result = self.classify(&input).await?;
            info!(intent = %result.intent, topic = %result.topic, "Classified input");
            state.set_intent(result.intent);
            state.set_topic(result.topic);
            Ok(())
        })
    }
}
