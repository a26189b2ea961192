use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::{
    errors::ClientError,
    types::{
        ChatReq, Chatbot, ChatbotList, CreateChatbotReq, CreateDialogueReq, Dialogue,
        DialogueList, Document, DocumentList, UpdateChatbotReq,
    },
};

/// Client for the chatbot service. Every authorized call takes the bearer
/// token explicitly so that the session stays the only owner of it.
#[derive(Clone, Debug)]
pub struct Api {
    client: Client,
    base_url: String,
}

/// A PDF picked for upload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub title: String,
    pub bytes: Vec<u8>,
}

impl Api {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    #[instrument(name = "List chatbots", skip_all)]
    pub async fn list_chatbots(&self, token: &str) -> Result<Vec<Chatbot>, ClientError> {
        let req = self.client.get(self.url("/chatbots")).bearer_auth(token);
        let list: ChatbotList = send_json(req).await?;
        Ok(list.chatbots)
    }

    #[instrument(name = "Create chatbot", skip(self, token))]
    pub async fn create_chatbot(
        &self,
        token: &str,
        payload: &CreateChatbotReq,
    ) -> Result<Chatbot, ClientError> {
        let req = self
            .client
            .post(self.url("/chatbots"))
            .bearer_auth(token)
            .json(payload);
        send_json(req).await
    }

    #[instrument(name = "Get chatbot", skip(self, token))]
    pub async fn get_chatbot(&self, token: &str, id: &str) -> Result<Chatbot, ClientError> {
        let req = self
            .client
            .get(self.url(&format!("/chatbots/{}", id)))
            .bearer_auth(token);
        send_json(req).await
    }

    #[instrument(name = "Update chatbot", skip(self, token))]
    pub async fn update_chatbot(
        &self,
        token: &str,
        id: &str,
        payload: &UpdateChatbotReq,
    ) -> Result<Chatbot, ClientError> {
        let req = self
            .client
            .put(self.url(&format!("/chatbots/{}", id)))
            .bearer_auth(token)
            .json(payload);
        send_json(req).await
    }

    #[instrument(name = "Delete chatbot", skip(self, token))]
    pub async fn delete_chatbot(&self, token: &str, id: &str) -> Result<(), ClientError> {
        let req = self
            .client
            .delete(self.url(&format!("/chatbots/{}", id)))
            .bearer_auth(token);
        send(req).await?;
        Ok(())
    }

    #[instrument(name = "List documents", skip(self, token))]
    pub async fn list_documents(
        &self,
        token: &str,
        chatbot_id: &str,
    ) -> Result<Vec<Document>, ClientError> {
        let req = self
            .client
            .get(self.url(&format!("/documents/{}", chatbot_id)))
            .bearer_auth(token);
        let list: DocumentList = send_json(req).await?;
        Ok(list.documents)
    }

    #[instrument(name = "Upload document", skip(self, token, upload), fields(file = %upload.file_name))]
    pub async fn upload_document(
        &self,
        token: &str,
        chatbot_id: &str,
        upload: Upload,
    ) -> Result<Document, ClientError> {
        let file = multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str("application/pdf")?;
        let form = multipart::Form::new()
            .part("file", file)
            .text("title", upload.title)
            .text("chatbot_id", chatbot_id.to_string());

        let req = self
            .client
            .post(self.url("/documents"))
            .bearer_auth(token)
            .multipart(form);
        send_json(req).await
    }

    #[instrument(name = "List dialogues", skip(self, token))]
    pub async fn list_dialogues(
        &self,
        token: &str,
        chatbot_id: &str,
    ) -> Result<Vec<Dialogue>, ClientError> {
        let req = self
            .client
            .get(self.url(&format!("/dialogues/chatbot/{}", chatbot_id)))
            .bearer_auth(token);
        let list: DialogueList = send_json(req).await?;
        Ok(list.dialogues)
    }

    #[instrument(name = "Create dialogue", skip(self, token, payload), fields(name = %payload.name))]
    pub async fn create_dialogue(
        &self,
        token: &str,
        payload: &CreateDialogueReq,
    ) -> Result<Dialogue, ClientError> {
        let req = self
            .client
            .post(self.url("/dialogues"))
            .bearer_auth(token)
            .json(payload);
        send_json(req).await
    }

    /// Opens the chat stream. The status is left for the caller to inspect,
    /// a 429 must not have its body read.
    #[instrument(name = "Open chat stream", skip(self, token, payload), fields(chatbot_id = %payload.chatbot_id, thread_id = %payload.thread_id))]
    pub async fn open_chat(
        &self,
        token: Option<&str>,
        payload: &ChatReq,
    ) -> Result<Response, ClientError> {
        let mut req = self
            .client
            .post(self.url("/chatbots/public/chat"))
            .json(payload);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        Ok(req.send().await?)
    }
}

async fn send(req: RequestBuilder) -> Result<Response, ClientError> {
    let resp = req.send().await?;
    let status = resp.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ClientError::RateLimited);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Status { status, body });
    }
    Ok(resp)
}

async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, ClientError> {
    let resp = send(req).await?;
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
