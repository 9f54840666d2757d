#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use chrono::{DateTime, TimeZone, Utc};
use futures::FutureExt as _;
use futures::future::LocalBoxFuture;
use tally_frontend_rs::mutations::{
    CreateExperienceInput, CreateExperienceOutcome, LoginInput, LoginOutcome, RegisterUserInput,
    RegisterUserOutcome, UpdateExperienceInput, UpdateExperiencesOutcome,
};
use tally_frontend_rs::types::User;
use tally_frontend_rs::{
    AppConfig, Connectivity, Env, MutationClient, Navigator, Route, TransportError, UserSession,
};

type Reply<T> = Result<Option<T>, TransportError>;

/// Answers every call with the next queued reply, or `Ok(None)` once the queue
/// runs dry, and records what it was asked.
#[derive(Default)]
pub struct FakeClient {
    pub create_replies: RefCell<VecDeque<Reply<Vec<CreateExperienceOutcome>>>>,
    pub update_replies: RefCell<VecDeque<Reply<UpdateExperiencesOutcome>>>,
    pub login_replies: RefCell<VecDeque<Reply<LoginOutcome>>>,
    pub register_replies: RefCell<VecDeque<Reply<RegisterUserOutcome>>>,

    pub created: RefCell<Vec<Vec<CreateExperienceInput>>>,
    pub updated: RefCell<Vec<Vec<UpdateExperienceInput>>>,
    pub logins: RefCell<Vec<LoginInput>>,
    pub registrations: RefCell<Vec<RegisterUserInput>>,
}

impl FakeClient {
    pub fn calls(&self) -> usize {
        self.created.borrow().len()
            + self.updated.borrow().len()
            + self.logins.borrow().len()
            + self.registrations.borrow().len()
    }
}

fn reply<T: 'static>(queue: &RefCell<VecDeque<Reply<T>>>) -> LocalBoxFuture<'static, Reply<T>> {
    let next = queue.borrow_mut().pop_front().unwrap_or(Ok(None));
    futures::future::ready(next).boxed_local()
}

impl MutationClient for FakeClient {
    fn create_experiences(
        &self,
        inputs: Vec<CreateExperienceInput>,
        _entries_pagination: serde_json::Value,
    ) -> LocalBoxFuture<'_, Reply<Vec<CreateExperienceOutcome>>> {
        self.created.borrow_mut().push(inputs);
        reply(&self.create_replies)
    }

    fn update_experiences(
        &self,
        inputs: Vec<UpdateExperienceInput>,
    ) -> LocalBoxFuture<'_, Reply<UpdateExperiencesOutcome>> {
        self.updated.borrow_mut().push(inputs);
        reply(&self.update_replies)
    }

    fn login(&self, input: LoginInput) -> LocalBoxFuture<'_, Reply<LoginOutcome>> {
        self.logins.borrow_mut().push(input);
        reply(&self.login_replies)
    }

    fn register_user(
        &self,
        input: RegisterUserInput,
    ) -> LocalBoxFuture<'_, Reply<RegisterUserOutcome>> {
        self.registrations.borrow_mut().push(input);
        reply(&self.register_replies)
    }
}

pub struct FakeConnectivity(pub Cell<Option<bool>>);

impl Connectivity for FakeConnectivity {
    fn is_connected(&self) -> Option<bool> {
        self.0.get()
    }
}

#[derive(Default)]
pub struct FakeNavigator {
    pub routes: RefCell<Vec<Route>>,
    pub scrolled: RefCell<Vec<String>>,
}

impl Navigator for FakeNavigator {
    fn navigate(&self, route: Route) {
        self.routes.borrow_mut().push(route);
    }

    fn scroll_into_view(&self, element_id: &str) {
        self.scrolled.borrow_mut().push(element_id.to_string());
    }
}

#[derive(Default)]
pub struct FakeSession {
    pub users: RefCell<Vec<User>>,
}

impl UserSession for FakeSession {
    fn store_user(&self, user: &User) {
        self.users.borrow_mut().push(user.clone());
    }
}

pub struct Harness {
    pub env: Env,
    pub client: Rc<FakeClient>,
    pub connectivity: Rc<FakeConnectivity>,
    pub navigator: Rc<FakeNavigator>,
    pub session: Rc<FakeSession>,
}

impl Harness {
    pub fn new(connected: Option<bool>) -> Self {
        tally_frontend_rs::init_logging();

        let client = Rc::new(FakeClient::default());
        let connectivity = Rc::new(FakeConnectivity(Cell::new(connected)));
        let navigator = Rc::new(FakeNavigator::default());
        let session = Rc::new(FakeSession::default());

        let env = Env::in_memory(
            AppConfig::default(),
            client.clone(),
            connectivity.clone(),
            navigator.clone(),
            session.clone(),
        );

        Self {
            env,
            client,
            connectivity,
            navigator,
            session,
        }
    }

    pub fn online() -> Self {
        Self::new(Some(true))
    }

    pub fn offline() -> Self {
        Self::new(Some(false))
    }

    pub fn go_online(&self) {
        self.connectivity.0.set(Some(true));
    }

    pub fn routes(&self) -> Vec<Route> {
        self.navigator.routes.borrow().clone()
    }

    /// Whether anything has been persisted since the harness was built.
    pub fn persisted(&self) -> bool {
        let store = normcache::Store::new();
        futures::executor::block_on(self.env.persistor.restore(&store)).unwrap_or(false)
    }
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 5, 8, 10, 30, 0).unwrap()
}
