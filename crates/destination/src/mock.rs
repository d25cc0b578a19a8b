//! A scripted in-memory destination used by tests across the workspace.

use models::RawRecord;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Script {
    statements: Vec<String>,
    inserted: Vec<(String, Vec<RawRecord>)>,
    // (sql substring, rows) lookups served by query_strings.
    query_results: Vec<(String, Vec<String>)>,
    // Consumed on the first execute whose SQL contains the substring.
    fail_execute_once: Option<String>,
    existing_tables: Vec<(String, String)>,
    execute_delay: Option<Duration>,
}

#[derive(Default)]
struct Shared {
    script: Mutex<Script>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    connections: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MockClient(Arc<Shared>);

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `rows` for any query whose SQL contains `sql_contains`.
    pub fn on_query(&self, sql_contains: &str, rows: Vec<String>) {
        self.0
            .script
            .lock()
            .unwrap()
            .query_results
            .push((sql_contains.to_string(), rows));
    }

    /// Fail the next execute whose SQL contains `sql_contains`, once.
    pub fn fail_execute_once(&self, sql_contains: &str) {
        self.0.script.lock().unwrap().fail_execute_once = Some(sql_contains.to_string());
    }

    pub fn add_existing_table(&self, database: &str, table: &str) {
        self.0
            .script
            .lock()
            .unwrap()
            .existing_tables
            .push((database.to_string(), table.to_string()));
    }

    /// Delay every execute, so tests can observe worker overlap.
    pub fn set_execute_delay(&self, delay: Duration) {
        self.0.script.lock().unwrap().execute_delay = Some(delay);
    }

    pub fn statements(&self) -> Vec<String> {
        self.0.script.lock().unwrap().statements.clone()
    }

    pub fn inserted(&self) -> Vec<(String, Vec<RawRecord>)> {
        self.0.script.lock().unwrap().inserted.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.0.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl crate::Client for MockClient {
    async fn execute(&self, sql: &str) -> anyhow::Result<()> {
        let delay = {
            let mut script = self.0.script.lock().unwrap();
            script.statements.push(sql.to_string());

            if let Some(marker) = script.fail_execute_once.clone() {
                if sql.contains(marker.as_str()) {
                    script.fail_execute_once = None;
                    anyhow::bail!("scripted failure for statement matching {marker:?}");
                }
            }
            script.execute_delay
        };

        let in_flight = self.0.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.0.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query_strings(&self, sql: &str) -> anyhow::Result<Vec<String>> {
        let script = self.0.script.lock().unwrap();
        for (substring, rows) in &script.query_results {
            if sql.contains(substring.as_str()) {
                return Ok(rows.clone());
            }
        }
        Ok(Vec::new())
    }

    async fn check_table_exists(&self, database: &str, table: &str) -> anyhow::Result<bool> {
        let script = self.0.script.lock().unwrap();
        Ok(script
            .existing_tables
            .iter()
            .any(|(d, t)| d == database && t == table))
    }

    async fn insert_raw(&self, table: &str, rows: Vec<RawRecord>) -> anyhow::Result<()> {
        self.0
            .script
            .lock()
            .unwrap()
            .inserted
            .push((table.to_string(), rows));
        Ok(())
    }
}

/// A destination whose shared and per-worker connections are all views of
/// one MockClient, so tests see a single statement log.
#[derive(Clone, Default)]
pub struct MockDestination {
    client: MockClient,
}

impl MockDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(&self) -> MockClient {
        self.client.clone()
    }

    pub fn connections_opened(&self) -> usize {
        self.client.0.connections.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl crate::Destination for MockDestination {
    fn shared(&self) -> Arc<dyn crate::Client> {
        Arc::new(self.client.clone())
    }

    async fn connect(&self) -> anyhow::Result<Arc<dyn crate::Client>> {
        self.client.0.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.client.clone()))
    }
}
