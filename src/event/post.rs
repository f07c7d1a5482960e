use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Moderation category assigned to every post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModerationFlag {
    #[serde(rename = "ontopic")]
    OnTopic,
    #[serde(rename = "nws")]
    NotWorkSafe,
    #[serde(rename = "stupid")]
    Stupid,
    #[serde(rename = "political")]
    PoliticalReligious,
    #[serde(rename = "tangent")]
    Tangent,
    #[serde(rename = "informative")]
    Informative,
    /// Suppressed by a moderator. Never returned as a live search result.
    #[serde(rename = "nuked")]
    Nuked,
}

impl ModerationFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationFlag::OnTopic => "ontopic",
            ModerationFlag::NotWorkSafe => "nws",
            ModerationFlag::Stupid => "stupid",
            ModerationFlag::PoliticalReligious => "political",
            ModerationFlag::Tangent => "tangent",
            ModerationFlag::Informative => "informative",
            ModerationFlag::Nuked => "nuked",
        }
    }
}

impl Default for ModerationFlag {
    fn default() -> Self {
        ModerationFlag::OnTopic
    }
}

impl fmt::Display for ModerationFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModerationFlag {
    type Err = String;

    /// Case-insensitive; also accepts the legacy `offtopic` spelling for tangent.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ontopic" => Ok(ModerationFlag::OnTopic),
            "nws" => Ok(ModerationFlag::NotWorkSafe),
            "stupid" => Ok(ModerationFlag::Stupid),
            "political" => Ok(ModerationFlag::PoliticalReligious),
            "tangent" | "offtopic" => Ok(ModerationFlag::Tangent),
            "informative" => Ok(ModerationFlag::Informative),
            "nuked" => Ok(ModerationFlag::Nuked),
            other => Err(format!("unknown moderation flag '{}'", other)),
        }
    }
}

/// A post as the post store hands it out. `body` is already rendered HTML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: u64,
    pub thread_id: u64,
    /// 0 for a thread root.
    pub parent_id: u64,
    pub author: String,
    #[serde(default)]
    pub category: ModerationFlag,
    pub date: DateTime<Utc>,
    pub body: String,
}

impl Post {
    pub fn is_root(&self) -> bool {
        self.parent_id == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moderation_flag_parses_legacy_names() {
        assert_eq!("offtopic".parse::<ModerationFlag>(), Ok(ModerationFlag::Tangent));
        assert_eq!("NUKED".parse::<ModerationFlag>(), Ok(ModerationFlag::Nuked));
        assert!("spam".parse::<ModerationFlag>().is_err());
    }

    #[test]
    fn post_uses_camel_case_wire_names() {
        let post = Post {
            id: 2,
            thread_id: 1,
            parent_id: 1,
            author: "mod".into(),
            category: ModerationFlag::Informative,
            date: Utc::now(),
            body: "new reply".into(),
        };
        let json = serde_json::to_value(&post).unwrap();
        assert_eq!(json["threadId"], 1);
        assert_eq!(json["parentId"], 1);
        assert_eq!(json["category"], "informative");
    }
}
