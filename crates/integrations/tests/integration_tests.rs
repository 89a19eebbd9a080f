//! Integration tests for the synchronization engine
//!
//! These drive full discover/reconcile flows against scripted fakes of
//! both remote systems and assert the engine's convergence properties.

use anyhow::Result;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};

use integrations::ats::api::{SearchResult, SubscriptionData, SubscriptionEvent};
use integrations::sync::{
    JOB_ORDER_UPDATED, JobOrderUpdateSync, PLACEMENT_INSERTED, PLACEMENT_STATUS_UPDATED,
    PlacementInsertSync, PlacementStatusSync, SubmissionStatusSync, VACANCY_SUBMISSION_ACCEPTED,
    VendorInviteSync,
};
use integrations::{
    InMemoryLedger, IntegrationConfig, Scheduler, SourceSystem, SyncEngine, TargetSystem,
    TenantContext, WebhookRouter,
};

// --- scripted source system ---

#[derive(Default)]
struct FakeSource {
    /// Pending feed batches per subscription name; polling drains them
    events: Mutex<HashMap<String, Vec<SubscriptionData>>>,
    /// `(kind, id)` -> full fetch body (including the `data` wrapper);
    /// absent entries answer 404
    entities: Mutex<HashMap<(String, i64), Value>>,
    /// Exact search query -> result; absent queries answer empty
    searches: Mutex<HashMap<String, SearchResult>>,
    /// Exact where clause -> result; absent clauses answer empty
    queries: Mutex<HashMap<String, SearchResult>>,
    create_status: AtomicU16,
    update_status: AtomicU16,
    created: Mutex<Vec<(String, Value)>>,
    updated: Mutex<Vec<(String, i64, Value)>>,
}

impl FakeSource {
    fn new() -> Self {
        let source = Self::default();
        source.create_status.store(200, Ordering::SeqCst);
        source.update_status.store(200, Ordering::SeqCst);
        source
    }

    fn push_events(&self, subscription: &str, events: Vec<SubscriptionEvent>) {
        self.events
            .lock()
            .unwrap()
            .entry(subscription.to_string())
            .or_default()
            .push(SubscriptionData {
                request_id: Some(1),
                events,
            });
    }

    fn put_entity(&self, kind: &str, id: i64, body: Value) {
        self.entities
            .lock()
            .unwrap()
            .insert((kind.to_string(), id), body);
    }

    fn put_search(&self, query: &str, result: SearchResult) {
        self.searches
            .lock()
            .unwrap()
            .insert(query.to_string(), result);
    }

    fn put_query(&self, where_clause: &str, result: SearchResult) {
        self.queries
            .lock()
            .unwrap()
            .insert(where_clause.to_string(), result);
    }
}

impl SourceSystem for FakeSource {
    fn fetch_entity(&self, kind: &str, id: i64, _fields: &[&str]) -> Result<(u16, Value)> {
        match self.entities.lock().unwrap().get(&(kind.to_string(), id)) {
            Some(body) => Ok((200, body.clone())),
            None => Ok((404, Value::Null)),
        }
    }

    fn search_entities(
        &self,
        _kind: &str,
        _fields: &[&str],
        query: &str,
    ) -> Result<(u16, SearchResult)> {
        let result = self
            .searches
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default();
        Ok((200, result))
    }

    fn query_entities(
        &self,
        _kind: &str,
        _fields: &[&str],
        where_clause: &str,
    ) -> Result<(u16, SearchResult)> {
        let result = self
            .queries
            .lock()
            .unwrap()
            .get(where_clause)
            .cloned()
            .unwrap_or_default();
        Ok((200, result))
    }

    fn create_entity(&self, kind: &str, body: &Value) -> Result<(u16, Value)> {
        self.created
            .lock()
            .unwrap()
            .push((kind.to_string(), body.clone()));
        Ok((self.create_status.load(Ordering::SeqCst), json!({})))
    }

    fn update_entity(&self, kind: &str, id: i64, body: &Value) -> Result<(u16, Value)> {
        self.updated
            .lock()
            .unwrap()
            .push((kind.to_string(), id, body.clone()));
        Ok((self.update_status.load(Ordering::SeqCst), json!({})))
    }

    fn poll_subscription_events(
        &self,
        name: &str,
        _max_events: usize,
    ) -> Result<(u16, SubscriptionData)> {
        // Reading is destructive, like the real feed
        let mut events = self.events.lock().unwrap();
        let batch = events
            .get_mut(name)
            .and_then(|queue| (!queue.is_empty()).then(|| queue.remove(0)))
            .unwrap_or_default();
        Ok((200, batch))
    }
}

// --- scripted target system ---

#[derive(Default)]
struct FakeTarget {
    workers: Mutex<HashMap<String, Value>>,
    vacancies: Mutex<HashMap<i64, Value>>,
    /// vacancy id -> prospects array
    prospects: Mutex<HashMap<i64, Value>>,
    place_status: AtomicU16,
    created_workers: Mutex<Vec<Value>>,
    placed: Mutex<Vec<Value>>,
    actions: Mutex<Vec<(String, Value)>>,
    prospect_updates: Mutex<Vec<(i64, String)>>,
    calls: AtomicUsize,
}

impl FakeTarget {
    fn new() -> Self {
        let target = Self::default();
        target.place_status.store(201, Ordering::SeqCst);
        target
    }

    fn put_worker(&self, id: &str, body: Value) {
        self.workers.lock().unwrap().insert(id.to_string(), body);
    }

    fn put_vacancy(&self, id: i64, body: Value) {
        self.vacancies.lock().unwrap().insert(id, body);
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TargetSystem for FakeTarget {
    fn create_worker(&self, body: &Value) -> Result<(u16, Value)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.created_workers.lock().unwrap().push(body.clone());
        // The portal answers with the registered record
        if let Some(id) = body.get("EmployeeId").and_then(Value::as_str) {
            self.workers
                .lock()
                .unwrap()
                .insert(id.to_string(), body.clone());
        }
        Ok((200, body.clone()))
    }

    fn get_worker(&self, id: &str) -> Result<(u16, Value)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.workers.lock().unwrap().get(id) {
            Some(body) => Ok((200, body.clone())),
            None => Ok((404, Value::Null)),
        }
    }

    fn trigger_action(&self, id: &str, body: &Value) -> Result<(u16, Value)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.actions
            .lock()
            .unwrap()
            .push((id.to_string(), body.clone()));
        Ok((200, json!({})))
    }

    fn get_vacancy(&self, id: i64) -> Result<(u16, Value)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.vacancies.lock().unwrap().get(&id) {
            Some(body) => Ok((200, body.clone())),
            None => Ok((404, Value::Null)),
        }
    }

    fn vacancy_prospects(&self, id: i64) -> Result<(u16, Value)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prospects = self
            .prospects
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| json!([]));
        Ok((200, prospects))
    }

    fn place_worker(&self, body: &Value) -> Result<(u16, Value)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.placed.lock().unwrap().push(body.clone());
        Ok((self.place_status.load(Ordering::SeqCst), json!({"id": 900})))
    }

    fn update_prospect_status(&self, id: i64, status: &str) -> Result<(u16, Value)> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prospect_updates
            .lock()
            .unwrap()
            .push((id, status.to_string()));
        Ok((204, Value::Null))
    }
}

// --- harness ---

fn test_config() -> IntegrationConfig {
    serde_json::from_value(json!({
        "name": "Acme",
        "webhookToken": "hook-secret",
        "pollIntervalSecs": 60,
        "ats": {
            "apiUrl": "https://auth.example",
            "clientId": "id",
            "clientSecret": "secret",
            "username": "user",
            "password": "pass",
            "redirectUri": "https://cb.example",
            "workerPrefix": "BH-",
            "candidateFields": ["id", "firstName"],
            "mappings": {
                "candidateToWorker": { "id": "EmployeeId", "firstName": "FirstName" }
            }
        },
        "portal": {
            "externalApi": "https://portal.example/api",
            "apiKey": "key",
            "candidateDefaults": { "address": { "countryID": 2359 } }
        }
    }))
    .unwrap()
}

struct Harness {
    context: Arc<TenantContext>,
    source: Arc<FakeSource>,
    target: Arc<FakeTarget>,
}

fn harness() -> Harness {
    let source = Arc::new(FakeSource::new());
    let target = Arc::new(FakeTarget::new());
    let context = Arc::new(TenantContext {
        config: test_config(),
        source: source.clone(),
        target: target.clone(),
        ledger: Arc::new(InMemoryLedger::new()),
    });
    Harness {
        context,
        source,
        target,
    }
}

fn placement_status_event(id: i64) -> SubscriptionEvent {
    SubscriptionEvent {
        entity_name: Some("Placement".to_string()),
        entity_id: Some(id),
        entity_event_type: Some("UPDATED".to_string()),
        updated_properties: vec!["status".to_string()],
    }
}

// --- scenarios ---

#[test]
fn test_placement_status_change_registers_worker_once() {
    let h = harness();
    h.source
        .push_events("placementUpdate", vec![placement_status_event(7)]);
    h.source.put_search(
        "id:7 AND status:Approved",
        SearchResult {
            total: Some(1),
            count: None,
            data: vec![json!({"id": 7, "status": "Approved", "candidate": {"id": 12}})],
        },
    );
    h.source
        .put_entity("Candidate", 12, json!({"data": {"id": 12, "firstName": "John"}}));

    let engine = SyncEngine::new(h.context.clone(), Box::new(PlacementStatusSync));
    let stats = engine.tick();

    assert_eq!(stats.discovered, 1);
    assert_eq!(stats.resolved, 1);
    assert!(h.context.ledger.scan(PLACEMENT_STATUS_UPDATED).unwrap().is_empty());

    // The worker was registered from mapped candidate data
    let created = h.target.created_workers.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0], json!({"EmployeeId": "BH-12", "FirstName": "John"}));

    // The registration notification fired, best-effort
    let actions = h.target.actions.lock().unwrap().clone();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].0, "BH-12");
    assert_eq!(actions[0].1.pointer("/type"), Some(&json!("registration")));
}

#[test]
fn test_duplicate_discovery_converges_without_double_registration() {
    let h = harness();
    h.source.put_search(
        "id:7 AND status:Approved",
        SearchResult {
            total: Some(1),
            count: None,
            data: vec![json!({"id": 7, "status": "Approved", "candidate": {"id": 12}})],
        },
    );
    h.source
        .put_entity("Candidate", 12, json!({"data": {"id": 12, "firstName": "John"}}));

    // The same id lands twice before any reconciliation runs: once from
    // the poll path, once from a racing push
    h.context
        .ledger
        .upsert(PLACEMENT_STATUS_UPDATED, "7", None)
        .unwrap();
    h.context
        .ledger
        .upsert(PLACEMENT_STATUS_UPDATED, "7", None)
        .unwrap();

    let engine = SyncEngine::new(h.context.clone(), Box::new(PlacementStatusSync));
    engine.tick();

    assert!(h.context.ledger.scan(PLACEMENT_STATUS_UPDATED).unwrap().is_empty());
    assert_eq!(h.target.created_workers.lock().unwrap().len(), 1);

    // A later re-discovery of the same id resolves against the existing
    // worker instead of registering again
    h.context
        .ledger
        .upsert(PLACEMENT_STATUS_UPDATED, "7", None)
        .unwrap();
    engine.tick();
    assert_eq!(h.target.created_workers.lock().unwrap().len(), 1);
}

#[test]
fn test_disqualified_placement_is_abandoned_without_target_calls() {
    let h = harness();
    // Fresh truth: the placement is no longer in the accepted status, so
    // the search comes back empty
    h.context
        .ledger
        .upsert(PLACEMENT_STATUS_UPDATED, "7", None)
        .unwrap();

    let engine = SyncEngine::new(h.context.clone(), Box::new(PlacementStatusSync));
    let stats = engine.tick();

    assert_eq!(stats.abandoned, 1);
    assert!(h.context.ledger.scan(PLACEMENT_STATUS_UPDATED).unwrap().is_empty());
    assert_eq!(h.target.call_count(), 0);
}

#[test]
fn test_transient_placement_failure_retries_without_rediscovery() {
    let h = harness();
    h.context.ledger.upsert(JOB_ORDER_UPDATED, "31", None).unwrap();
    h.source.put_entity(
        "JobOrder",
        31,
        json!({"data": {
            "id": 31,
            "externalID": "ENG-5",
            "placements": { "total": 1, "data": [ { "id": 77 } ] }
        }}),
    );
    h.source.put_entity(
        "Placement",
        77,
        json!({"data": {
            "id": 77,
            "candidate": { "id": 12 },
            "dateBegin": 1_704_067_200_000i64,
            "durationWeeks": 10,
            "payRate": 10.5,
            "clientBillRate": 15.75
        }}),
    );
    h.target.put_worker("BH-12", json!({"EmployeeId": "BH-12"}));

    // First attempt: the portal is having a bad day
    h.target.place_status.store(503, Ordering::SeqCst);
    let engine = SyncEngine::new(h.context.clone(), Box::new(JobOrderUpdateSync));
    let stats = engine.tick();

    assert_eq!(stats.retried, 1);
    assert_eq!(h.context.ledger.scan(JOB_ORDER_UPDATED).unwrap().len(), 1);

    // Next tick: recovered; the same item completes without re-discovery
    h.target.place_status.store(201, Ordering::SeqCst);
    let stats = engine.tick();

    assert_eq!(stats.discovered, 0);
    assert_eq!(stats.resolved, 1);
    assert!(h.context.ledger.scan(JOB_ORDER_UPDATED).unwrap().is_empty());

    let placed = h.target.placed.lock().unwrap().clone();
    assert_eq!(placed.len(), 2);
    assert_eq!(
        placed[1],
        json!({
            "personId": "BH-12",
            "vacancyDetailId": 5,
            "startDate": "2024-01-01",
            "finishDate": "2024-03-11",
            "rates": [
                {
                    "name": "rate",
                    "payRate": 10.5,
                    "chargeTotal": 15.75,
                    "payType": "CONTRACT",
                    "rateType": "HOURLY"
                }
            ]
        })
    );
}

#[test]
fn test_placement_insert_confirms_matching_prospect_only() {
    let h = harness();
    h.context.ledger.upsert(PLACEMENT_INSERTED, "77", None).unwrap();
    h.source.put_entity(
        "Placement",
        77,
        json!({"data": {
            "id": 77,
            "candidate": { "id": 12 },
            "jobOrder": { "externalID": "ENG-5" }
        }}),
    );
    h.target.prospects.lock().unwrap().insert(
        5,
        json!([
            { "id": 301, "personExternalId": "BH-12" },
            { "id": 302, "personExternalId": "BH-99" }
        ]),
    );

    let engine = SyncEngine::new(h.context.clone(), Box::new(PlacementInsertSync));
    let stats = engine.tick();

    assert_eq!(stats.resolved, 1);
    assert!(h.context.ledger.scan(PLACEMENT_INSERTED).unwrap().is_empty());
    // Only the prospect belonging to this candidate was confirmed
    let updates = h.target.prospect_updates.lock().unwrap().clone();
    assert_eq!(updates, vec![(301, "CONFIRMED".to_string())]);
}

#[test]
fn test_foreign_job_order_is_abandoned() {
    let h = harness();
    h.context.ledger.upsert(JOB_ORDER_UPDATED, "31", None).unwrap();
    h.source.put_entity(
        "JobOrder",
        31,
        json!({"data": {"id": 31, "externalID": "OTHER-5", "placements": {"total": 1}}}),
    );

    let engine = SyncEngine::new(h.context.clone(), Box::new(JobOrderUpdateSync));
    let stats = engine.tick();

    assert_eq!(stats.abandoned, 1);
    assert_eq!(h.target.call_count(), 0);
}

#[test]
fn test_vendor_invite_webhook_creates_job_order_immediately() {
    let h = harness();
    h.target.put_vacancy(
        5,
        json!({"hiringManager": {"email": "mgr@example.com"}, "tradeName": "Fitter"}),
    );
    h.source.put_search(
        "email:mgr@example.com",
        SearchResult {
            total: Some(1),
            count: None,
            data: vec![json!({"id": 3, "clientCorporation": {"id": 9}})],
        },
    );

    let router = WebhookRouter::new(vec![h.context.clone()]);
    router.dispatch(
        "hook-secret",
        &json!({"type": "vacancy", "action": "vendorInvited", "id": 5}),
    );

    // The immediate best-effort pass already completed the obligation
    assert!(h.context.ledger.scan("vac:ven:inv").unwrap().is_empty());
    let created = h.source.created.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].0, "JobOrder");
    assert_eq!(
        created[0].1,
        json!({
            "clientContact": { "id": 3 },
            "clientCorporation": { "id": 9 },
            "title": "Fitter",
            "externalID": "ENG-5"
        })
    );
}

#[test]
fn test_vendor_invite_duplicate_resolves_without_creating() {
    let h = harness();
    h.source.put_search(
        "externalID:ENG-5",
        SearchResult {
            total: Some(1),
            count: None,
            data: vec![json!({"id": 41})],
        },
    );
    h.context.ledger.upsert("vac:ven:inv", "5", None).unwrap();

    let engine = SyncEngine::new(h.context.clone(), Box::new(VendorInviteSync));
    let stats = engine.tick();

    assert_eq!(stats.resolved, 1);
    assert!(h.source.created.lock().unwrap().is_empty());
}

#[test]
fn test_submission_accepted_mirrors_status_onto_job_submission() {
    let h = harness();
    h.source.put_query(
        "jobOrder.externalID='ENG-5' AND candidate.id=12",
        SearchResult {
            total: None,
            count: Some(1),
            data: vec![json!({"id": 88})],
        },
    );

    let router = WebhookRouter::new(vec![h.context.clone()]);
    router.dispatch(
        "hook-secret",
        &json!({
            "type": "vacancy",
            "action": "submissionStatusChanged",
            "id": 5,
            "workerId": "BH-12",
            "submissionId": 88,
            "submissionStatus": "ACCEPTED"
        }),
    );

    // The webhook only persists; the tick completes the obligation
    let items = h.context.ledger.scan(VACANCY_SUBMISSION_ACCEPTED).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].entity_id, "88");

    let engine = SyncEngine::new(h.context.clone(), Box::new(SubmissionStatusSync::accepted()));
    let stats = engine.tick();

    assert_eq!(stats.resolved, 1);
    let updated = h.source.updated.lock().unwrap().clone();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].0, "JobSubmission");
    assert_eq!(updated[0].1, 88);
    assert_eq!(updated[0].2, json!({"status": "Offer Extended"}));
}

#[test]
fn test_uninteresting_submission_status_is_ignored() {
    let h = harness();
    let router = WebhookRouter::new(vec![h.context.clone()]);
    router.dispatch(
        "hook-secret",
        &json!({
            "type": "vacancy",
            "action": "submissionStatusChanged",
            "id": 5,
            "workerId": "BH-12",
            "submissionId": 88,
            "submissionStatus": "WITHDRAWN"
        }),
    );

    assert!(h.context.ledger.scan(VACANCY_SUBMISSION_ACCEPTED).unwrap().is_empty());
    assert!(h.context.ledger.scan("vac:sub:rej").unwrap().is_empty());
}

#[test]
fn test_unknown_webhook_action_and_token_are_dropped() {
    let h = harness();
    let router = WebhookRouter::new(vec![h.context.clone()]);

    router.dispatch("hook-secret", &json!({"type": "thing", "action": "happened"}));
    router.dispatch("wrong-token", &json!({"type": "vacancy", "action": "vendorInvited", "id": 5}));

    assert!(h.context.ledger.scan("vac:ven:inv").unwrap().is_empty());
    assert_eq!(h.target.call_count(), 0);
    assert!(h.source.created.lock().unwrap().is_empty());
    assert!(h.source.updated.lock().unwrap().is_empty());
}

#[test]
fn test_worker_update_webhook_mirrors_candidate() {
    let h = harness();
    h.target.put_worker(
        "BH-12",
        json!({"EmployeeId": "BH-12", "FirstName": "Johnny"}),
    );
    h.source.put_entity("Candidate", 12, json!({"data": {"id": 12}}));

    let router = WebhookRouter::new(vec![h.context.clone()]);
    router.dispatch(
        "hook-secret",
        &json!({"type": "worker", "action": "update", "id": "BH-12"}),
    );

    let updated = h.source.updated.lock().unwrap().clone();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].0, "Candidate");
    assert_eq!(updated[0].1, 12);
    // Mapped back through the inverse dictionary, with the configured
    // defaults overlaid
    assert_eq!(
        updated[0].2,
        json!({
            "id": "12",
            "firstName": "Johnny",
            "address": { "countryID": 2359 }
        })
    );
}

#[test]
fn test_scheduler_ticks_all_categories_and_stops_promptly() {
    let h = harness();
    // One pending vendor invitation that resolves as a duplicate
    h.source.put_search(
        "externalID:ENG-5",
        SearchResult {
            total: Some(1),
            count: None,
            data: vec![json!({"id": 41})],
        },
    );
    h.context.ledger.upsert("vac:ven:inv", "5", None).unwrap();

    let scheduler = Scheduler::start(vec![h.context.clone()]);
    std::thread::sleep(std::time::Duration::from_millis(300));

    assert!(h.context.ledger.scan("vac:ven:inv").unwrap().is_empty());

    let begun = std::time::Instant::now();
    scheduler.shutdown();
    assert!(begun.elapsed() < std::time::Duration::from_secs(2));
}
