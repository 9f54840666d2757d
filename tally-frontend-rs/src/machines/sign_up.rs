use crate::context::{Env, Route};
use crate::machines::{
    Checked, Dispatch, EffectHandler, FORM_CONTAINS_ERRORS, FieldState, GENERIC_ERROR, Machine,
    NOT_CONNECTED, Submission, check_text, email_errors, length_errors, nothing_to_save, settle,
};
use crate::mutations::{RegisterUserError, RegisterUserInput, RegisterUserOutcome};

pub const NOTIFICATION_ID: &str = "sign-up-submit-notification";
const MIN_NAME_LENGTH: usize = 2;
const MIN_PASSWORD_LENGTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignUpState {
    pub name: FieldState<String>,
    pub email: FieldState<String>,
    pub password: FieldState<String>,
    pub password_confirmation: FieldState<String>,
    pub submission: Submission,
    effects: Vec<SignUpEffect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpAction {
    SetName(String),
    SetEmail(String),
    SetPassword(String),
    SetPasswordConfirmation(String),
    Submit,
    ServerErrors(RegisterUserError),
    CommonError(String),
    CloseSubmitNotification,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpEffect {
    ScrollToNotification,
    RegisterUser(RegisterUserInput),
}

impl Machine for SignUpState {
    type Action = SignUpAction;
    type Effect = SignUpEffect;

    fn reduce(&self, action: SignUpAction) -> Self {
        let mut next = self.clone();
        next.effects.clear();

        match action {
            SignUpAction::SetName(value) => next.name = FieldState::changed(value),
            SignUpAction::SetEmail(value) => next.email = FieldState::changed(value),
            SignUpAction::SetPassword(value) => next.password = FieldState::changed(value),
            SignUpAction::SetPasswordConfirmation(value) => {
                next.password_confirmation = FieldState::changed(value)
            }
            SignUpAction::Submit => next.submit(),
            SignUpAction::ServerErrors(errors) => next.project_server_errors(errors),
            SignUpAction::CommonError(message) => {
                next.submission = Submission::CommonErrors(message);
                next.effects.push(SignUpEffect::ScrollToNotification);
            }
            SignUpAction::CloseSubmitNotification => next.submission = Submission::Inactive,
            SignUpAction::Reset => next = SignUpState::default(),
        }

        next
    }

    fn effects(&self) -> &[SignUpEffect] {
        &self.effects
    }
}

impl SignUpState {
    fn submit(&mut self) {
        let any_changed = self.name.is_changed()
            || self.email.is_changed()
            || self.password.is_changed()
            || self.password_confirmation.is_changed();
        if !any_changed {
            nothing_to_save(
                &mut self.submission,
                &mut self.effects,
                SignUpEffect::ScrollToNotification,
            );
            return;
        }

        let name = check_text(&mut self.name, "name", true, |value| {
            length_errors(value, MIN_NAME_LENGTH)
        });
        let email = check_text(&mut self.email, "email", true, email_errors);
        let password = check_text(&mut self.password, "password", true, |value| {
            length_errors(value, MIN_PASSWORD_LENGTH)
        });

        let password_value = self.password.value().cloned().unwrap_or_default();
        let confirmation = check_text(
            &mut self.password_confirmation,
            "password confirmation",
            true,
            |value| {
                if value == password_value {
                    vec![]
                } else {
                    vec!["does not match password".to_string()]
                }
            },
        );

        let submit = match (name, email, password, confirmation) {
            (
                Checked::Valid(name),
                Checked::Valid(email),
                Checked::Valid(password),
                Checked::Valid(password_confirmation),
            ) => Some(SignUpEffect::RegisterUser(RegisterUserInput {
                name: name.trim().to_string(),
                email: email.trim().to_string(),
                password,
                password_confirmation,
                source: None,
            })),
            _ => None,
        };

        settle(
            &mut self.submission,
            &mut self.effects,
            submit,
            SignUpEffect::ScrollToNotification,
        );
    }

    fn project_server_errors(&mut self, errors: RegisterUserError) {
        let fields = [
            (&mut self.name, "name", errors.name),
            (&mut self.email, "email", errors.email),
            (&mut self.password, "password", errors.password),
            (
                &mut self.password_confirmation,
                "password confirmation",
                errors.password_confirmation,
            ),
        ];

        let mut projected = false;
        for (field, label, message) in fields {
            if let Some(message) = message {
                field.invalidate(String::new(), vec![(label.to_string(), message)]);
                projected = true;
            }
        }

        let banner = if projected { FORM_CONTAINS_ERRORS } else { GENERIC_ERROR };
        self.submission = Submission::CommonErrors(banner.to_string());
        self.effects.push(SignUpEffect::ScrollToNotification);
    }
}

pub struct SignUpEffects {
    pub env: Env,
}

impl EffectHandler<SignUpState> for SignUpEffects {
    async fn run(&self, effect: SignUpEffect, dispatch: &Dispatch<SignUpAction>) {
        match effect {
            SignUpEffect::ScrollToNotification => {
                self.env.navigator.scroll_into_view(NOTIFICATION_ID);
            }
            SignUpEffect::RegisterUser(input) => {
                if !self.env.is_connected() {
                    dispatch.send(SignUpAction::CommonError(NOT_CONNECTED.to_string()));
                    return;
                }

                match self.env.client.register_user(input).await {
                    Ok(Some(RegisterUserOutcome::UserSuccess { user })) => {
                        log::info!("Registered user {}", user.id);
                        self.env.session.store_user(&user);
                        self.env.persist_cache().await;
                        self.env.navigator.navigate(Route::My);
                    }
                    Ok(Some(RegisterUserOutcome::RegisterUserErrors { errors })) => {
                        dispatch.send(SignUpAction::ServerErrors(errors));
                    }
                    Ok(Some(RegisterUserOutcome::Unknown) | None) => {
                        dispatch.send(SignUpAction::CommonError(GENERIC_ERROR.to_string()));
                    }
                    Err(e) => {
                        log::error!("Registering user failed: {e}");
                        dispatch.send(SignUpAction::CommonError(e.to_string()));
                    }
                }
            }
        }
    }
}
