use crate::context::{Env, Route};
use crate::machines::{
    Checked, Dispatch, EffectHandler, FieldState, GENERIC_ERROR, Machine, NOT_CONNECTED,
    Submission, check_text, email_errors, length_errors, nothing_to_save, settle,
};
use crate::mutations::{LoginInput, LoginOutcome};

pub const NOTIFICATION_ID: &str = "login-submit-notification";
const MIN_PASSWORD_LENGTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginState {
    pub email: FieldState<String>,
    pub password: FieldState<String>,
    pub submission: Submission,
    effects: Vec<LoginEffect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginAction {
    SetEmail(String),
    SetPassword(String),
    Submit,
    CommonError(String),
    CloseSubmitNotification,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginEffect {
    ScrollToNotification,
    Login(LoginInput),
}

impl Machine for LoginState {
    type Action = LoginAction;
    type Effect = LoginEffect;

    fn reduce(&self, action: LoginAction) -> Self {
        let mut next = self.clone();
        next.effects.clear();

        match action {
            LoginAction::SetEmail(email) => next.email = FieldState::changed(email),
            LoginAction::SetPassword(password) => next.password = FieldState::changed(password),
            LoginAction::Submit => next.submit(),
            LoginAction::CommonError(message) => {
                next.submission = Submission::CommonErrors(message);
                next.effects.push(LoginEffect::ScrollToNotification);
            }
            LoginAction::CloseSubmitNotification => next.submission = Submission::Inactive,
            LoginAction::Reset => next = LoginState::default(),
        }

        next
    }

    fn effects(&self) -> &[LoginEffect] {
        &self.effects
    }
}

impl LoginState {
    fn submit(&mut self) {
        if !self.email.is_changed() && !self.password.is_changed() {
            nothing_to_save(
                &mut self.submission,
                &mut self.effects,
                LoginEffect::ScrollToNotification,
            );
            return;
        }

        let email = check_text(&mut self.email, "email", true, email_errors);
        let password = check_text(&mut self.password, "password", true, |value| {
            length_errors(value, MIN_PASSWORD_LENGTH)
        });

        let submit = match (email, password) {
            (Checked::Valid(email), Checked::Valid(password)) => Some(LoginEffect::Login(LoginInput {
                email: email.trim().to_string(),
                password,
            })),
            _ => None,
        };

        settle(
            &mut self.submission,
            &mut self.effects,
            submit,
            LoginEffect::ScrollToNotification,
        );
    }
}

pub struct LoginEffects {
    pub env: Env,
}

impl EffectHandler<LoginState> for LoginEffects {
    async fn run(&self, effect: LoginEffect, dispatch: &Dispatch<LoginAction>) {
        match effect {
            LoginEffect::ScrollToNotification => {
                self.env.navigator.scroll_into_view(NOTIFICATION_ID);
            }
            LoginEffect::Login(input) => {
                if !self.env.is_connected() {
                    dispatch.send(LoginAction::CommonError(NOT_CONNECTED.to_string()));
                    return;
                }

                match self.env.client.login(input).await {
                    Ok(Some(LoginOutcome::UserSuccess { user })) => {
                        log::info!("Logged in as {}", user.id);
                        self.env.session.store_user(&user);
                        self.env.persist_cache().await;
                        self.env.navigator.navigate(Route::My);
                    }
                    Ok(Some(LoginOutcome::LoginError { error })) => {
                        dispatch.send(LoginAction::CommonError(error));
                    }
                    Ok(Some(LoginOutcome::Unknown) | None) => {
                        dispatch.send(LoginAction::CommonError(GENERIC_ERROR.to_string()));
                    }
                    Err(e) => {
                        log::error!("Login failed: {e}");
                        dispatch.send(LoginAction::CommonError(e.to_string()));
                    }
                }
            }
        }
    }
}
