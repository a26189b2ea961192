use crate::{
    api::Api,
    errors::ClientError,
    types::{Chatbot, CreateChatbotReq},
};

/// Bot list of the signed-in user.
#[derive(Debug, Default)]
pub struct HomeView {
    bots: Vec<Chatbot>,
    error: Option<String>,
}

impl HomeView {
    pub fn bots(&self) -> &[Chatbot] {
        &self.bots
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub async fn load(&mut self, api: &Api, token: &str) -> Result<(), ClientError> {
        match api.list_chatbots(token).await {
            Ok(bots) => {
                self.bots = bots;
                self.error = None;
                Ok(())
            }
            Err(err) => {
                tracing::error!("Error fetching chatbots: {}", err);
                self.error = Some(match err {
                    ClientError::Decode(_) => "Unexpected API response format.".to_string(),
                    _ => "Failed to load chatbots.".to_string(),
                });
                Err(err)
            }
        }
    }

    pub async fn create(
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
        let payload = CreateChatbotReq {
            name: name.to_string(),
            description: description.to_string(),
        };
        let bot = api.create_chatbot(token, &payload).await.map_err(|err| {
            tracing::error!("Error creating chatbot: {}", err);
            err
        })?;
        tracing::info!("Created chatbot {} ({})", bot.name, bot.id);
        self.bots.push(bot);
        Ok(&self.bots[self.bots.len() - 1])
    }
}
