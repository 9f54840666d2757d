mod common;

use common::{Harness, now};
use futures::executor::block_on;
use tally_frontend_rs::machines::login::{LoginAction, LoginEffects, LoginState};
use tally_frontend_rs::machines::new_experience::{
    NewExperienceAction, NewExperienceEffects, NewExperienceState,
};
use tally_frontend_rs::machines::sign_up::{SignUpAction, SignUpEffects, SignUpState};
use tally_frontend_rs::machines::{
    ALREADY_TAKEN, FORM_CONTAINS_ERRORS, NOT_CONNECTED, Runner, Submission,
};
use tally_frontend_rs::mutations::{
    CreateExperienceError, CreateExperienceOutcome, DefinitionError, LoginOutcome,
    RegisterUserError, RegisterUserOutcome,
};
use tally_frontend_rs::offline_ids::is_offline_id;
use tally_frontend_rs::types::{
    DataDefinition, DataTypes, ExperienceConnection, Experience, User,
};
use tally_frontend_rs::{LedgerEntry, Route};

fn user() -> User {
    User {
        typename: "User".to_string(),
        id: "u1".to_string(),
        email: "me@example.com".to_string(),
        jwt: Some("token".to_string()),
    }
}

fn login_runner(harness: &Harness) -> Runner<LoginState, LoginEffects> {
    let runner = Runner::new(
        LoginState::default(),
        LoginEffects {
            env: harness.env.clone(),
        },
    );
    block_on(runner.dispatch(LoginAction::SetEmail("me@example.com".to_string())));
    block_on(runner.dispatch(LoginAction::SetPassword("hunter2".to_string())));
    runner
}

#[test]
fn logging_in_while_offline_is_refused() {
    let harness = Harness::offline();
    let runner = login_runner(&harness);

    block_on(runner.dispatch(LoginAction::Submit));

    assert_eq!(
        runner.state().submission,
        Submission::CommonErrors(NOT_CONNECTED.to_string())
    );
    assert_eq!(harness.client.calls(), 0);
    assert!(harness.routes().is_empty());
}

#[test]
fn logging_in_stores_the_user_and_leaves() {
    let harness = Harness::online();
    harness
        .client
        .login_replies
        .borrow_mut()
        .push_back(Ok(Some(LoginOutcome::UserSuccess { user: user() })));
    let runner = login_runner(&harness);

    block_on(runner.dispatch(LoginAction::Submit));

    assert_eq!(*harness.session.users.borrow(), vec![user()]);
    assert_eq!(harness.routes(), vec![Route::My]);
    assert_eq!(runner.state().submission, Submission::Active);
}

#[test]
fn login_errors_from_the_server_become_the_banner() {
    let harness = Harness::online();
    harness
        .client
        .login_replies
        .borrow_mut()
        .push_back(Ok(Some(LoginOutcome::LoginError {
            error: "Invalid email/password".to_string(),
        })));
    let runner = login_runner(&harness);

    block_on(runner.dispatch(LoginAction::Submit));

    assert_eq!(
        runner.state().submission,
        Submission::CommonErrors("Invalid email/password".to_string())
    );
    assert!(harness.session.users.borrow().is_empty());
}

#[test]
fn sign_up_errors_are_shown_on_their_fields() {
    let harness = Harness::online();
    harness
        .client
        .register_replies
        .borrow_mut()
        .push_back(Ok(Some(RegisterUserOutcome::RegisterUserErrors {
            errors: RegisterUserError {
                email: Some(ALREADY_TAKEN.to_string()),
                ..Default::default()
            },
        })));
    let runner = Runner::new(
        SignUpState::default(),
        SignUpEffects {
            env: harness.env.clone(),
        },
    );

    for action in [
        SignUpAction::SetName("Kanmii".to_string()),
        SignUpAction::SetEmail("me@example.com".to_string()),
        SignUpAction::SetPassword("hunter2".to_string()),
        SignUpAction::SetPasswordConfirmation("hunter2".to_string()),
        SignUpAction::Submit,
    ] {
        block_on(runner.dispatch(action));
    }

    let state = runner.state();
    assert_eq!(state.submission, Submission::CommonErrors(FORM_CONTAINS_ERRORS.to_string()));
    assert_eq!(
        state.email.errors(),
        Some(&vec![("email".to_string(), ALREADY_TAKEN.to_string())])
    );
    assert!(!state.name.is_invalid());
    assert_eq!(harness.client.registrations.borrow().len(), 1);
}

fn filled_experience_form() -> Vec<NewExperienceAction> {
    vec![
        NewExperienceAction::SetTitle("Sleep".to_string()),
        NewExperienceAction::SetDefinitionName {
            row: 0,
            name: "hours".to_string(),
        },
        NewExperienceAction::SetDefinitionType {
            row: 0,
            type_: DataTypes::Integer,
        },
        NewExperienceAction::Submit,
    ]
}

fn experience_runner(harness: &Harness) -> Runner<NewExperienceState, NewExperienceEffects> {
    Runner::new(
        NewExperienceState::default(),
        NewExperienceEffects {
            env: harness.env.clone(),
        },
    )
}

#[test]
fn offline_experiences_go_to_the_top_of_the_list() {
    let harness = Harness::offline();
    let runner = experience_runner(&harness);

    for action in filled_experience_form() {
        block_on(runner.dispatch(action));
    }

    let routes = harness.routes();
    let [Route::Experience(id)] = routes.as_slice() else {
        panic!("expected to land on the new experience, got {routes:?}");
    };
    assert!(is_offline_id(id));

    let cache = &harness.env.cache;
    let experience = cache.read_experience(id).unwrap();
    assert_eq!(experience.title, "Sleep");
    assert_eq!(experience.data_definitions[0].name, "hours");
    assert!(is_offline_id(&experience.data_definitions[0].id));
    assert_eq!(cache.read_mini_list().unwrap().edges[0].node.id, *id);
    assert_eq!(cache.ledger_entry(id), Some(LedgerEntry::NewOffline));
    assert!(harness.persisted());
}

#[test]
fn online_experiences_come_from_the_server() {
    let harness = Harness::online();
    harness.env.cache.write_mini_list(&ExperienceConnection::default());
    let server = Experience::new(
        "srv-1",
        "Sleep",
        vec![DataDefinition::new("srv-d1", "hours", DataTypes::Integer)],
        now(),
    );
    harness
        .client
        .create_replies
        .borrow_mut()
        .push_back(Ok(Some(vec![CreateExperienceOutcome::ExperienceSuccess {
            experience: server,
            entries_errors: None,
        }])));
    let runner = experience_runner(&harness);

    for action in filled_experience_form() {
        block_on(runner.dispatch(action));
    }

    let sent = harness.client.created.borrow();
    assert_eq!(sent[0][0].title, "Sleep");
    assert_eq!(sent[0][0].data_definitions[0].type_, DataTypes::Integer);

    assert_eq!(harness.routes(), vec![Route::Experience("srv-1".to_string())]);
    let cache = &harness.env.cache;
    assert!(cache.read_experience("srv-1").is_some());
    assert_eq!(cache.read_mini_list().unwrap().edges[0].node.id, "srv-1");
    assert_eq!(cache.ledger_entry("srv-1"), None);
}

#[test]
fn definition_errors_from_the_server_find_their_row() {
    let harness = Harness::online();
    harness
        .client
        .create_replies
        .borrow_mut()
        .push_back(Ok(Some(vec![CreateExperienceOutcome::CreateExperienceErrors {
            errors: CreateExperienceError {
                title: Some(ALREADY_TAKEN.to_string()),
                data_definitions: Some(vec![DefinitionError {
                    index: 0,
                    name: Some("is invalid".to_string()),
                    type_: None,
                }]),
                ..Default::default()
            },
        }])));
    let runner = experience_runner(&harness);

    for action in filled_experience_form() {
        block_on(runner.dispatch(action));
    }

    let state = runner.state();
    assert_eq!(state.submission, Submission::CommonErrors(FORM_CONTAINS_ERRORS.to_string()));
    assert!(state.title.is_invalid());
    assert!(state.definitions[0].name.is_invalid());
    assert!(!state.definitions[0].type_.is_invalid());
    assert!(harness.routes().is_empty());
}
