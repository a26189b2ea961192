use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Chatbot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub settings: Option<ChatbotSettings>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatbotSettings {
    pub embedding_model: EmbeddingModel,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EmbeddingModel {
    pub provider: String,
    pub name: String,
    pub dimensions: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub chatbot_id: String,
    pub title: String,
    #[serde(default)]
    pub file_url: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Dialogue {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub sync_status: SyncStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Ingestion state reported by the server for documents and dialogues.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Failed,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
            SyncStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ChatbotList {
    pub chatbots: Vec<Chatbot>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DocumentList {
    pub documents: Vec<Document>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DialogueList {
    pub dialogues: Vec<Dialogue>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CreateChatbotReq {
    pub name: String,
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UpdateChatbotReq {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CreateDialogueReq {
    pub chatbot_id: String,
    pub name: String,
    pub questions: Vec<String>,
    pub answer: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatReq {
    pub chatbot_id: String,
    pub thread_id: String,
    pub message: String,
}
