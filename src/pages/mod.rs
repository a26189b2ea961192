use crate::session::SessionState;

mod auth;
pub use auth::*;
mod bot;
pub use bot::*;
mod home;
pub use home::*;

pub const DEFAULT_THREAD: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Root,
    Login,
    Signup,
    Verify { email: String },
    Home,
    Bot { id: String },
    Dialogues { bot_id: String },
    Chat { bot_id: String, thread_id: String },
}

impl Route {
    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            Route::Home | Route::Bot { .. } | Route::Dialogues { .. } | Route::Chat { .. }
        )
    }

    pub fn path(&self) -> String {
        match self {
            Route::Root => "/".to_string(),
            Route::Login => "/login".to_string(),
            Route::Signup => "/signup".to_string(),
            Route::Verify { email } => format!("/verify?email={}", email),
            Route::Home => "/home".to_string(),
            Route::Bot { id } => format!("/bot/{}", id),
            Route::Dialogues { bot_id } => format!("/bot/{}/dialogues", bot_id),
            Route::Chat { bot_id, thread_id } => format!("/chat/{}/{}", bot_id, thread_id),
        }
    }

    /// Where `back` leads from this route.
    pub fn parent(&self) -> Route {
        match self {
            Route::Chat { bot_id, .. } | Route::Dialogues { bot_id } => Route::Bot {
                id: bot_id.clone(),
            },
            Route::Verify { .. } => Route::Signup,
            Route::Signup => Route::Login,
            _ => Route::Home,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// The first session check has not finished, decide nothing yet.
    Pending,
    Allow,
    Redirect(Route),
}

pub fn guard(route: &Route, state: &SessionState) -> Access {
    if !state.ready {
        return Access::Pending;
    }
    let authenticated = state.is_authenticated();
    match route {
        Route::Root => Access::Redirect(Route::Home),
        Route::Login | Route::Signup if authenticated => Access::Redirect(Route::Home),
        route if route.requires_auth() && !authenticated => Access::Redirect(Route::Login),
        _ => Access::Allow,
    }
}

/// What a view action asks the shell to do next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Effect {
    pub notice: Option<String>,
    pub navigate: Option<Route>,
}

impl Effect {
    pub fn navigate(route: Route) -> Self {
        Self {
            notice: None,
            navigate: Some(route),
        }
    }

    pub fn notice(msg: impl Into<String>) -> Self {
        Self {
            notice: Some(msg.into()),
            navigate: None,
        }
    }

    pub fn with_notice(mut self, msg: impl Into<String>) -> Self {
        self.notice = Some(msg.into());
        self
    }
}

/// Inline error strings are the only failure a view reports.
pub type ViewResult = Result<Effect, String>;

#[cfg(test)]
mod tests {
    use super::*;

    fn state(ready: bool, token: Option<&str>) -> SessionState {
        SessionState {
            access_token: token.map(|x| x.to_string()),
            ready,
        }
    }

    #[test]
    fn test_no_redirect_before_ready() {
        let not_ready = state(false, None);
        assert_eq!(guard(&Route::Home, &not_ready), Access::Pending);
        assert_eq!(guard(&Route::Login, &not_ready), Access::Pending);
    }

    #[test]
    fn test_protected_routes_redirect_to_login() {
        let anonymous = state(true, None);
        for route in [
            Route::Home,
            Route::Bot { id: "b1".to_string() },
            Route::Dialogues {
                bot_id: "b1".to_string(),
            },
            Route::Chat {
                bot_id: "b1".to_string(),
                thread_id: DEFAULT_THREAD.to_string(),
            },
        ] {
            assert_eq!(guard(&route, &anonymous), Access::Redirect(Route::Login));
        }
        assert_eq!(guard(&Route::Login, &anonymous), Access::Allow);
        assert_eq!(
            guard(
                &Route::Verify {
                    email: "a@b.c".to_string()
                },
                &anonymous
            ),
            Access::Allow
        );
    }

    #[test]
    fn test_signed_in_user_skips_login() {
        let signed_in = state(true, Some("token"));
        assert_eq!(guard(&Route::Login, &signed_in), Access::Redirect(Route::Home));
        assert_eq!(guard(&Route::Signup, &signed_in), Access::Redirect(Route::Home));
        assert_eq!(guard(&Route::Home, &signed_in), Access::Allow);
        assert_eq!(guard(&Route::Root, &signed_in), Access::Redirect(Route::Home));
    }

    #[test]
    fn test_paths_and_parents() {
        let chat = Route::Chat {
            bot_id: "b1".to_string(),
            thread_id: "t9".to_string(),
        };
        assert_eq!(chat.path(), "/chat/b1/t9");
        assert_eq!(chat.parent(), Route::Bot { id: "b1".to_string() });
        assert_eq!(Route::Bot { id: "b1".to_string() }.parent(), Route::Home);
    }
}
