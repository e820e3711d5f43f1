//! The context object every remote operation goes through.
//!
//! # Design
//! `Messenger` owns the stateless client, a transport, the deferred queue, the
//! merge policy and the two process-level flags (delayed mode, increment
//! mode). Reads always go out immediately; writes are either sent or appended
//! to the deferred log, and say which through `Dispatch`. Every executed call
//! overwrites the last-error slot, so it always describes the latest call.

use std::mem;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::client::IntercomClient;
use crate::config::ClientConfig;
use crate::error::{ApiError, LastError};
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::lookup::UserLookup;
use crate::merge::{AttributeSource, MergePolicy};
use crate::queue::{DeferredCall, DeferredQueue, ReplayReport};
use crate::types::{AccountSnapshot, Impression, RemoteUser, UserList, UserPayload};

/// Whether a write reached the remote service or was deferred.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch<T> {
    Sent(T),
    Deferred,
}

impl<T> Dispatch<T> {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Dispatch::Deferred)
    }

    pub fn sent(self) -> Option<T> {
        match self {
            Dispatch::Sent(value) => Some(value),
            Dispatch::Deferred => None,
        }
    }
}

/// Result of `Messenger::delete_all_users`.
#[derive(Debug, Default)]
pub struct PurgeReport {
    pub deleted: usize,
    pub deferred: usize,
    /// Identifiers whose delete failed, with the error.
    pub failed: Vec<(String, ApiError)>,
}

pub struct Messenger<T: Transport> {
    client: IntercomClient,
    transport: T,
    queue: DeferredQueue,
    merge: MergePolicy,
    debug: bool,
    delayed: bool,
    increment_mode: bool,
    last_error: Option<LastError>,
    bulk: Vec<UserPayload>,
}

impl<T: Transport> Messenger<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self {
            client: IntercomClient::new(&config.endpoint, config.credentials()),
            transport,
            queue: DeferredQueue::new(config.delayed_log),
            merge: config.merge,
            debug: config.debug,
            delayed: config.delayed,
            increment_mode: config.increment_mode,
            last_error: None,
            bulk: Vec::new(),
        }
    }

    pub fn client(&self) -> &IntercomClient {
        &self.client
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn queue(&self) -> &DeferredQueue {
        &self.queue
    }

    pub fn merge_policy(&self) -> &MergePolicy {
        &self.merge
    }

    /// Takes effect from the next call; calls already made are not re-routed.
    pub fn set_delayed(&mut self, delayed: bool) {
        self.delayed = delayed;
    }

    pub fn delayed(&self) -> bool {
        self.delayed
    }

    pub fn set_increment_mode(&mut self, increment_mode: bool) {
        self.increment_mode = increment_mode;
    }

    pub fn increment_mode(&self) -> bool {
        self.increment_mode
    }

    /// Outcome of the most recent call; `None` after a success.
    pub fn last_error(&self) -> Option<&LastError> {
        self.last_error.as_ref()
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn list_users(&mut self, page: u32, per_page: Option<u32>) -> Result<UserList, ApiError> {
        let request = self.client.build_list_users(page, per_page);
        self.execute(request, IntercomClient::parse_list_users)
    }

    pub fn get_user(&mut self, identifier: &str) -> Result<RemoteUser, ApiError> {
        let request = self.client.build_get_user(&UserLookup::detect(identifier));
        self.execute(request, IntercomClient::parse_user)
    }

    pub fn get_thread(&mut self, identifier: &str) -> Result<Vec<Value>, ApiError> {
        let request = self.client.build_get_thread(&UserLookup::detect(identifier));
        self.execute(request, IntercomClient::parse_thread)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub fn create_user(&mut self, input: &UserPayload) -> Result<Dispatch<RemoteUser>, ApiError> {
        let request = self.build(|client| client.build_create_user(input))?;
        self.dispatch(request, IntercomClient::parse_user)
    }

    pub fn update_user(&mut self, input: &UserPayload) -> Result<Dispatch<RemoteUser>, ApiError> {
        let request = self.build(|client| client.build_update_user(input))?;
        self.dispatch(request, IntercomClient::parse_user)
    }

    pub fn delete_user(&mut self, identifier: &str) -> Result<Dispatch<RemoteUser>, ApiError> {
        let request = self.client.build_delete_user(&UserLookup::detect(identifier));
        self.dispatch(request, IntercomClient::parse_user)
    }

    pub fn create_impression(&mut self, input: &Impression) -> Result<Dispatch<Value>, ApiError> {
        let request = self.build(|client| client.build_create_impression(input))?;
        self.dispatch(request, IntercomClient::parse_impression)
    }

    // -----------------------------------------------------------------------
    // Account workflows
    // -----------------------------------------------------------------------

    /// Create the remote user for a new account, with every counter present.
    pub fn register_account(
        &mut self,
        account: &AccountSnapshot,
        seed: Map<String, Value>,
    ) -> Result<Dispatch<RemoteUser>, ApiError> {
        let source: &dyn AttributeSource = account;
        let custom_data = self.merge.reconcile(None, seed, Some(source), self.increment_mode);
        self.create_user(&account.to_payload(custom_data, Vec::new()))
    }

    /// Push account changes, merging counters with the current remote record.
    ///
    /// The remote user is fetched in real time even in delayed mode; a 404
    /// is treated as "no remote record yet".
    pub fn sync_account(
        &mut self,
        account: &AccountSnapshot,
        custom_data: Map<String, Value>,
    ) -> Result<Dispatch<RemoteUser>, ApiError> {
        let remote = match self.get_user(&account.user_id) {
            Ok(user) => Some(user),
            Err(ApiError::NotFound) => None,
            Err(err) => return Err(err),
        };

        let source: &dyn AttributeSource = account;
        let merged = self
            .merge
            .reconcile(remote.as_ref(), custom_data, Some(source), self.increment_mode);

        let mut payload = account.to_payload(merged, Vec::new());
        payload.last_request_at = None;
        if let Some(remote) = remote {
            payload.user_id = remote.user_id.or(payload.user_id);
            payload.email = remote.email.or(payload.email);
        }
        self.update_user(&payload)
    }

    /// Create the remote user as-is, without counter reconciliation.
    pub fn import_account(
        &mut self,
        account: &AccountSnapshot,
        custom_data: Map<String, Value>,
        companies: Vec<Value>,
    ) -> Result<Dispatch<RemoteUser>, ApiError> {
        self.create_user(&account.to_payload(custom_data, companies))
    }

    /// Buffer an account for the next `bulk_import`.
    pub fn queue_bulk_import(
        &mut self,
        account: &AccountSnapshot,
        custom_data: Map<String, Value>,
        companies: Vec<Value>,
    ) {
        self.bulk.push(account.to_payload(custom_data, companies));
    }

    pub fn bulk_pending(&self) -> usize {
        self.bulk.len()
    }

    /// Send all buffered accounts in one call. The buffer is emptied whether
    /// or not the call succeeds.
    pub fn bulk_import(&mut self) -> Result<Dispatch<Value>, ApiError> {
        let users = mem::take(&mut self.bulk);
        let request = self.build(|client| client.build_bulk_create(&users))?;
        self.dispatch(request, IntercomClient::parse_bulk_create)
    }

    /// Delete every user on the first page of `per_page` users.
    pub fn delete_all_users(&mut self, per_page: u32) -> Result<PurgeReport, ApiError> {
        let list = self.list_users(1, Some(per_page))?;
        info!(users = list.users.len(), "deleting users");

        let mut report = PurgeReport::default();
        for user in list.users {
            let Some(identifier) = user.email.or(user.user_id) else {
                continue;
            };
            match self.delete_user(&identifier) {
                Ok(Dispatch::Sent(_)) => report.deleted += 1,
                Ok(Dispatch::Deferred) => report.deferred += 1,
                Err(err) => {
                    warn!(user = %identifier, error = %err, "delete failed");
                    report.failed.push((identifier, err));
                }
            }
        }
        Ok(report)
    }

    /// Drain the deferred log through this messenger's transport.
    pub fn replay_deferred(&mut self) -> ReplayReport {
        let report = self.queue.drain_and_replay(&self.client, &self.transport);
        self.last_error = report.aborted.as_ref().map(|err| LastError {
            code: "replay_aborted",
            message: err.to_string(),
        });
        report
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    fn build<F>(&mut self, build: F) -> Result<HttpRequest, ApiError>
    where
        F: FnOnce(&IntercomClient) -> Result<HttpRequest, ApiError>,
    {
        build(&self.client).map_err(|err| self.record(err))
    }

    fn dispatch<R, P>(&mut self, request: HttpRequest, parse: P) -> Result<Dispatch<R>, ApiError>
    where
        P: FnOnce(&IntercomClient, HttpResponse) -> Result<R, ApiError>,
    {
        if !self.delayed {
            return self.execute(request, parse).map(Dispatch::Sent);
        }
        match self.queue.enqueue(&DeferredCall::from(&request)) {
            Ok(()) => {
                self.last_error = None;
                Ok(Dispatch::Deferred)
            }
            Err(err) => Err(self.record(err.into())),
        }
    }

    fn execute<R, P>(&mut self, request: HttpRequest, parse: P) -> Result<R, ApiError>
    where
        P: FnOnce(&IntercomClient, HttpResponse) -> Result<R, ApiError>,
    {
        if self.debug {
            debug!(
                method = %request.method,
                url = %request.path,
                body = request.body.as_deref().unwrap_or_default(),
                "sending request"
            );
        }

        let result = self
            .transport
            .execute(&request)
            .map_err(ApiError::from)
            .and_then(|response| {
                if self.debug {
                    debug!(status = response.status, url = %request.path, "received response");
                }
                parse(&self.client, response)
            });

        match result {
            Ok(value) => {
                self.last_error = None;
                Ok(value)
            }
            Err(err) => Err(self.record(err)),
        }
    }

    fn record(&mut self, err: ApiError) -> ApiError {
        self.last_error = Some(LastError::from(&err));
        err
    }
}
