use std::path::Path;

use crate::{
    api::{Api, Upload},
    errors::ClientError,
    types::{Chatbot, Document, UpdateChatbotReq},
};

/// Details of one bot and its knowledge documents.
#[derive(Debug)]
pub struct BotView {
    id: String,
    bot: Option<Chatbot>,
    documents: Vec<Document>,
}

impl BotView {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bot: None,
            documents: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bot(&self) -> Option<&Chatbot> {
        self.bot.as_ref()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub async fn load(&mut self, api: &Api, token: &str) -> Result<(), ClientError> {
        let bot = api.get_chatbot(token, &self.id).await.map_err(|err| {
            tracing::error!("Error fetching chatbot {}: {}", self.id, err);
            err
        })?;
        self.bot = Some(bot);
        self.documents.clear();
        self.documents = api.list_documents(token, &self.id).await.map_err(|err| {
            tracing::error!("Error fetching documents of {}: {}", self.id, err);
            err
        })?;
        Ok(())
    }

    fn loaded(&self) -> Result<&Chatbot, ClientError> {
        self.bot
            .as_ref()
            .ok_or_else(|| ClientError::Validation("Bot not found".to_string()))
    }

    /// Flips the public flag on the server and returns the new value.
    pub async fn toggle_public(&mut self, api: &Api, token: &str) -> Result<bool, ClientError> {
        let bot = self.loaded()?;
        let payload = UpdateChatbotReq {
            name: bot.name.clone(),
            description: bot.description.clone(),
            is_public: Some(!bot.is_public),
        };
        let updated = api.update_chatbot(token, &self.id, &payload).await?;
        let is_public = updated.is_public;
        self.bot = Some(updated);
        Ok(is_public)
    }

    pub async fn update(
        &mut self,
        api: &Api,
        token: &str,
        name: &str,
        description: &str,
    ) -> Result<&Chatbot, ClientError> {
        let (name, description) = (name.trim(), description.trim());
        if name.is_empty() || description.is_empty() {
            return Err(ClientError::Validation(
                "A bot needs a name and a description.".to_string(),
            ));
        }
        self.loaded()?;
        let payload = UpdateChatbotReq {
            name: name.to_string(),
            description: description.to_string(),
            is_public: None,
        };
        let updated = api.update_chatbot(token, &self.id, &payload).await?;
        Ok(&*self.bot.insert(updated))
    }

    pub async fn delete(&mut self, api: &Api, token: &str) -> Result<(), ClientError> {
        api.delete_chatbot(token, &self.id).await?;
        tracing::info!("Deleted chatbot {}", self.id);
        self.bot = None;
        self.documents.clear();
        Ok(())
    }

    /// Uploads a PDF as a knowledge source. `title` defaults to the file name.
    pub async fn upload(
        &mut self,
        api: &Api,
        token: &str,
        path: &Path,
        title: Option<&str>,
    ) -> Result<&Document, ClientError> {
        let upload = read_pdf(path, title).await?;
        let document = api.upload_document(token, &self.id, upload).await?;
        tracing::info!("Uploaded {} as document {}", path.display(), document.id);
        self.documents.push(document);
        Ok(&self.documents[self.documents.len() - 1])
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|x| x.to_str())
        .map_or(false, |x| x.eq_ignore_ascii_case("pdf"))
}

async fn read_pdf(path: &Path, title: Option<&str>) -> Result<Upload, ClientError> {
    if !is_pdf(path) {
        return Err(ClientError::Validation(
            "Please select a valid PDF file.".to_string(),
        ));
    }
    let file_name = path
        .file_name()
        .and_then(|x| x.to_str())
        .unwrap_or("document.pdf")
        .to_string();
    let bytes = tokio::fs::read(path).await?;
    let title = title
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| file_name.clone());
    Ok(Upload {
        file_name,
        title,
        bytes,
    })
}
