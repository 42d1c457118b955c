use serde::{Deserialize, Deserializer};

use crate::content::normalize_keyword_list;
use crate::db::models::{Post, PostLength, Section, SeoMetadata};

/// Partial edit of a post. `None` leaves a field untouched; `Some` replaces it.
/// `seo` distinguishes "absent" from an explicit `null`, which clears the block.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostUpdate {
    pub title: Option<String>,
    pub introduction: Option<String>,
    pub body: Option<String>,
    pub conclusion: Option<String>,
    pub keywords: Option<Vec<String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub seo: Option<Option<SeoMetadata>>,
    pub tone: Option<String>,
    pub audience: Option<String>,
    pub length: Option<PostLength>,
}

fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl PostUpdate {
    pub fn section(section: Section, text: String) -> Self {
        let mut update = Self::default();
        match section {
            Section::Introduction => update.introduction = Some(text),
            Section::Body => update.body = Some(text),
            Section::Conclusion => update.conclusion = Some(text),
        }
        update
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies each present field to `post` and refreshes `updated_at`.
    pub fn apply_to(&self, post: &mut Post) {
        if let Some(title) = &self.title {
            post.title = title.trim().to_string();
        }
        if let Some(introduction) = &self.introduction {
            post.introduction = introduction.clone();
        }
        if let Some(body) = &self.body {
            post.body = body.clone();
        }
        if let Some(conclusion) = &self.conclusion {
            post.conclusion = conclusion.clone();
        }
        if let Some(keywords) = &self.keywords {
            post.keywords = normalize_keyword_list(keywords.iter().map(String::as_str));
        }
        if let Some(seo) = &self.seo {
            post.seo = seo.clone();
        }
        if let Some(tone) = &self.tone {
            post.tone = tone.clone();
        }
        if let Some(audience) = &self.audience {
            post.audience = audience.clone();
        }
        if let Some(length) = self.length {
            post.length = length;
        }
        post.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_post() -> Post {
        let now = Utc::now();
        Post {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Original".into(),
            introduction: "intro".into(),
            body: "body".into(),
            conclusion: "outro".into(),
            keywords: vec!["rust".into()],
            length: PostLength::Medium,
            tone: "friendly".into(),
            audience: "devs".into(),
            seo: Some(SeoMetadata {
                keyword_density: [("rust".to_string(), 2.0)].into_iter().collect(),
                meta_title: "Meta".into(),
                meta_description: "Desc".into(),
                readability: "Easy".into(),
            }),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn absent_fields_are_left_alone() {
        let update: PostUpdate = serde_json::from_value(serde_json::json!({
            "body": "new body",
            "length": "long"
        }))
        .unwrap();
        let mut post = sample_post();
        let before = post.clone();
        update.apply_to(&mut post);

        assert_eq!(post.body, "new body");
        assert_eq!(post.length, PostLength::Long);
        assert_eq!(post.introduction, before.introduction);
        assert_eq!(post.conclusion, before.conclusion);
        assert_eq!(post.seo, before.seo);
        assert_eq!(post.created_at, before.created_at);
        assert!(post.updated_at > before.updated_at);
    }

    #[test]
    fn explicit_null_clears_seo() {
        let update: PostUpdate = serde_json::from_value(serde_json::json!({ "seo": null })).unwrap();
        assert_eq!(update.seo, Some(None));

        let mut post = sample_post();
        update.apply_to(&mut post);
        assert!(post.seo.is_none());

        let untouched: PostUpdate = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(untouched.is_empty());
    }

    #[test]
    fn keywords_are_normalized_on_edit() {
        let update = PostUpdate {
            keywords: Some(vec![" seo ".into(), "".into(), "seo".into(), "SEO".into()]),
            ..Default::default()
        };
        let mut post = sample_post();
        update.apply_to(&mut post);
        assert_eq!(post.keywords, vec!["seo".to_string(), "SEO".to_string()]);
    }

    #[test]
    fn unknown_length_is_rejected() {
        let parsed = serde_json::from_value::<PostUpdate>(serde_json::json!({ "length": "epic" }));
        assert!(parsed.is_err());
    }
}
