//! Grounded prompt assembly

use crate::domain::conversation::ConversationMessage;
use crate::domain::index::RetrievalResult;
use crate::domain::language::Language;
use crate::domain::llm::{CompletionOptions, LlmRequest};

const CONTEXT_PLACEHOLDER: &str = "{context}";
const DOCUMENT_SEPARATOR: &str = "\n\n---\n\n";

const ENGLISH_TEMPLATE: &str = "You are a helpful assistant that answers questions based on the provided context.

Instructions:
1. Answer the question using ONLY the information from the context below.
2. If the context doesn't contain enough information to answer, say \"I don't have enough information to answer this question.\"
3. Always cite your sources by referencing the document numbers and names, e.g. [Document 1].
4. Be concise and direct in your answers.

Context:
{context}";

const GERMAN_TEMPLATE: &str = "Du bist ein hilfreicher Assistent, der Fragen auf Grundlage des bereitgestellten Kontexts beantwortet.

Anweisungen:
1. Beantworte die Frage AUSSCHLIESSLICH mit Informationen aus dem folgenden Kontext.
2. Wenn der Kontext nicht genügend Informationen enthält, antworte: \"Ich habe nicht genügend Informationen, um diese Frage zu beantworten.\"
3. Nenne immer deine Quellen, indem du die Dokumentnummern und -namen angibst, z. B. [Dokument 1].
4. Antworte knapp und direkt.
5. Antworte auf Deutsch.

Kontext:
{context}";

const ENGLISH_NO_CONTEXT: &str = "(No relevant documents were found in the corpus.)";
const GERMAN_NO_CONTEXT: &str = "(Im Korpus wurden keine relevanten Dokumente gefunden.)";

/// Instruction template with a `{context}` placeholder
pub fn instruction_template(language: Language) -> &'static str {
    match language {
        Language::English => ENGLISH_TEMPLATE,
        Language::German => GERMAN_TEMPLATE,
    }
}

/// Text placed in the context slot when retrieval found nothing
pub fn no_context_marker(language: Language) -> &'static str {
    match language {
        Language::English => ENGLISH_NO_CONTEXT,
        Language::German => GERMAN_NO_CONTEXT,
    }
}

/// Number the retrieved chunks and label each with its source
pub fn format_context(retrieval: &RetrievalResult, language: Language) -> String {
    if retrieval.is_empty() {
        return no_context_marker(language).to_string();
    }

    let label = match language {
        Language::English => "Document",
        Language::German => "Dokument",
    };

    retrieval
        .iter()
        .enumerate()
        .map(|(i, scored)| {
            let metadata = &scored.chunk.metadata;
            let mut source = format!("Source: {}", metadata.source_name);

            if let Some(section) = &metadata.section {
                source.push_str(&format!(", Section: {section}"));
            }
            if let Some(page) = metadata.page {
                source.push_str(&format!(", Page: {page}"));
            }

            format!("[{label} {}] ({source})\n{}", i + 1, scored.chunk.text.trim())
        })
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR)
}

/// Build the completion request: instructions with context, remembered
/// turns, then the question.
pub fn build_request(
    question: &str,
    retrieval: &RetrievalResult,
    history: &[ConversationMessage],
    language: Language,
    options: &CompletionOptions,
) -> LlmRequest {
    let system = instruction_template(language)
        .replace(CONTEXT_PLACEHOLDER, &format_context(retrieval, language));

    LlmRequest::builder()
        .system(system)
        .messages(history.iter().map(ConversationMessage::to_llm_message))
        .user(question)
        .options(options.clone())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::index::ScoredChunk;
    use crate::domain::ingestion::{Chunk, ChunkMetadata};
    use crate::domain::llm::{Message, MessageRole};

    fn scored(source: &str, text: &str, section: Option<&str>, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: format!("{source}-0"),
                document_id: source.to_string(),
                text: text.to_string(),
                position: 0,
                metadata: ChunkMetadata {
                    source_name: source.to_string(),
                    section: section.map(str::to_string),
                    page: None,
                    char_start: 0,
                    char_end: text.chars().count(),
                    overlap_chars: 0,
                },
            },
            score,
        }
    }

    #[test]
    fn test_context_numbers_chunks_with_sources() {
        let retrieval = RetrievalResult::new(vec![
            scored("policy_a.md", "Refund period: 30 days.\n", Some("Refunds"), 0.9),
            scored("policy_b.txt", "Refund period: 60 days.", None, 0.8),
        ]);

        let context = format_context(&retrieval, Language::English);

        assert_eq!(
            context,
            "[Document 1] (Source: policy_a.md, Section: Refunds)\nRefund period: 30 days.\n\n---\n\n[Document 2] (Source: policy_b.txt)\nRefund period: 60 days."
        );
    }

    #[test]
    fn test_empty_retrieval_uses_marker() {
        let request = build_request(
            "What is the refund period?",
            &RetrievalResult::default(),
            &[],
            Language::English,
            &CompletionOptions::default(),
        );

        let system = request.system_text().unwrap();
        assert!(system.contains(ENGLISH_NO_CONTEXT));
        assert!(!system.contains(CONTEXT_PLACEHOLDER));
    }

    #[test]
    fn test_german_template() {
        let retrieval = RetrievalResult::new(vec![scored("a.md", "Frist: 30 Tage", None, 0.5)]);
        let request = build_request(
            "Wie lange ist die Frist?",
            &retrieval,
            &[],
            Language::German,
            &CompletionOptions::default(),
        );

        let system = request.system_text().unwrap();
        assert!(system.starts_with("Du bist"));
        assert!(system.contains("[Dokument 1] (Source: a.md)"));
    }

    #[test]
    fn test_history_sits_between_system_and_question() {
        let history = vec![
            ConversationMessage::user("first question"),
            ConversationMessage::assistant("first answer", vec![]),
        ];

        let request = build_request(
            "second question",
            &RetrievalResult::default(),
            &history,
            Language::English,
            &CompletionOptions::default().with_max_tokens(10),
        );

        let roles: Vec<MessageRole> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User
            ]
        );
        assert_eq!(request.messages[3], Message::user("second question"));
        assert_eq!(request.options.max_tokens, 10);
    }
}
