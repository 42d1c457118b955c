use std::collections::BTreeMap;

use crate::db::models::Section;
use crate::gateway::{ChatMessage, GenerationBrief, SectionContext};

const WRITER_SYSTEM: &str = "You create publication-ready marketing blog posts.";
const EDITOR_SYSTEM: &str = "You are an elite SaaS content editor.";

pub fn full_post(brief: &GenerationBrief) -> Vec<ChatMessage> {
    let prompt = format!(
        "You are an expert SaaS content marketer. Write a blog post with an engaging introduction, \
         rich body with descriptive sub-headings, and a concise conclusion.\n\
         Title: {title}\n\
         Keywords: {keywords}\n\
         Tone: {tone}\n\
         Audience: {audience}\n\
         Length: {words} words (approx).\n\n\
         Respond with a JSON object containing the keys introduction, body, conclusion, seo. \
         introduction, body and conclusion must be strings.\n\
         The seo object must contain metaTitle, metaDescription and readability as strings, and \
         keywordDensity as an object mapping each keyword to its percentage.\n\
         Return valid JSON only. Do not wrap the JSON in markdown code fences or add commentary.",
        title = brief.title,
        keywords = brief.keywords.as_deref().unwrap_or(""),
        tone = brief.tone,
        audience = brief.audience,
        words = brief.length.target_word_count(),
    );

    vec![ChatMessage::system(WRITER_SYSTEM), ChatMessage::user(prompt)]
}

pub fn section_rewrite(section: Section, context: &SectionContext) -> Vec<ChatMessage> {
    let brief = &context.brief;
    let mut prompt = format!(
        "You are updating the {section} of a blog post titled \"{title}\".\n\
         Tone: {tone}. Audience: {audience}.\n\
         Keywords: {keywords}.\n",
        title = brief.title,
        tone = brief.tone,
        audience = brief.audience,
        keywords = brief.keywords.as_deref().unwrap_or(""),
    );
    if !context.current.is_empty() {
        prompt.push_str(&format!("Current {section}: {}\n", context.current));
    }
    if !context.other_sections.is_empty() {
        let others: BTreeMap<&str, &str> = context
            .other_sections
            .iter()
            .map(|(s, text)| (s.as_str(), text.as_str()))
            .collect();
        let others = serde_json::to_string(&others).unwrap_or_default();
        prompt.push_str(&format!("Other sections for context: {others}\n"));
    }
    prompt.push_str(&format!(
        "Rewrite only the {section} with engaging copy. Provide markdown with headings where relevant.\n\
         Respond with the updated {section} only. Do not include code fences."
    ));

    vec![ChatMessage::system(EDITOR_SYSTEM), ChatMessage::user(prompt)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::PostLength;
    use crate::gateway::ChatMessage;

    fn brief() -> GenerationBrief {
        GenerationBrief {
            title: "Why Rust".into(),
            keywords: None,
            tone: "friendly".into(),
            audience: "devs".into(),
            length: PostLength::Medium,
        }
    }

    #[test]
    fn full_post_carries_word_hint_and_blank_keywords() {
        let messages = full_post(&brief());
        assert_eq!(messages.len(), 2);
        let ChatMessage::User { content } = &messages[1] else {
            panic!("expected user prompt");
        };
        assert!(content.contains("Length: 900 words (approx)."));
        assert!(content.contains("Keywords: \n"));
        assert!(content.contains("Title: Why Rust"));
    }

    #[test]
    fn section_prompt_includes_other_sections_only() {
        let context = SectionContext {
            brief: brief(),
            current: "old body".into(),
            other_sections: vec![
                (Section::Introduction, "intro text".into()),
                (Section::Conclusion, "outro text".into()),
            ],
        };
        let messages = section_rewrite(Section::Body, &context);
        let ChatMessage::User { content } = &messages[1] else {
            panic!("expected user prompt");
        };
        assert!(content.contains("updating the body"));
        assert!(content.contains("Current body: old body"));
        assert!(content.contains(r#""introduction":"intro text""#));
        assert!(content.contains(r#""conclusion":"outro text""#));
        assert!(!content.contains(r#""body":"#));
    }
}
