use std::io;
use std::sync::Arc;

use tracing::{error, info};

use crate::config::TaggerConfig;
use crate::context::{self, current_tag, snapshot};
use crate::error::{ErrorCategory, Result};
use crate::listener::Record;
use crate::persistence::{FlushMode, WriteBehindSession};
use crate::tagger::Tagger;
use crate::unit_of_work::{LocalUnitOfWorkManager, UnitOfWorkManager};

struct Customer {
    id: u32,
}

impl Record for Customer {
    fn record_kind(&self) -> &str {
        "shop::Customer"
    }

    fn record_id(&self) -> Option<String> {
        Some(self.id.to_string())
    }
}

struct PurchaseOrder {
    id: u32,
}

impl Record for PurchaseOrder {
    fn record_kind(&self) -> &str {
        "shop::PurchaseOrder"
    }

    fn record_id(&self) -> Option<String> {
        Some(self.id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioOutcome {
    pub name: &'static str,
    pub passed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DemoReport {
    pub scenarios: Vec<ScenarioOutcome>,
}

impl DemoReport {
    pub fn all_passed(&self) -> bool {
        self.scenarios.iter().all(|s| s.passed)
    }

    fn record(&mut self, name: &'static str, passed: bool) {
        if passed {
            info!("✓ {}", name);
        } else {
            error!("✗ {}", name);
        }
        self.scenarios.push(ScenarioOutcome { name, passed });
    }
}

fn tag_string() -> Option<String> {
    current_tag().map(|t| t.into_string())
}

/// Replays the reference call chains against an in-memory session and
/// reports whether every tag resolved as expected
pub async fn run_demo(config: TaggerConfig) -> Result<DemoReport> {
    let manager = LocalUnitOfWorkManager::new();
    let tagger = Arc::new(Tagger::new(config, Arc::new(manager))?);
    let mut report = DemoReport::default();

    report.record("A: sequential access, no unit of work", scenario_a(&tagger));
    report.record("B: deferred write flushed at commit", scenario_b(&tagger, manager));
    report.record("C: nested service keeps outer marker", scenario_c(&tagger));
    report.record("D: persistence failure logged once", scenario_d(&tagger));
    report.record(
        "E: concurrent async calls stay isolated",
        scenario_async(&tagger, manager).await,
    );

    Ok(report)
}

fn scenario_a(tagger: &Tagger) -> bool {
    let session = WriteBehindSession::new(FlushMode::Immediate).with_listener(tagger.listener());
    let service = tagger.service("serviceA");
    let repo_a = tagger.data_access("repoA");
    let repo_b = tagger.data_access("repoB");

    let (during_find, during_save) = service.run("methodX", || {
        let find = repo_a.run("find", || {
            session.load(&Customer { id: 1 });
            tag_string()
        });
        let save = repo_b.run("save", || {
            session.create(&PurchaseOrder { id: 10 });
            tag_string()
        });
        (find, save)
    });

    during_find.as_deref() == Some("serviceA.methodX.repoA.find")
        && during_save.as_deref() == Some("serviceA.methodX.repoB.save")
        && current_tag().is_none()
}

fn scenario_b(tagger: &Tagger, manager: LocalUnitOfWorkManager) -> bool {
    let session = WriteBehindSession::new(FlushMode::Deferred).with_listener(tagger.listener());
    let service = tagger.service("serviceA");
    let repo_b = tagger.data_access("repoB");

    let uow = manager.begin();
    service.run("methodX", || {
        repo_b.run("save", || session.create(&PurchaseOrder { id: 11 }));
    });

    let after_return = tag_string();
    let flushed = session.pending().len();
    session.commit(uow);

    after_return.as_deref() == Some("serviceA.methodX.repoB.save")
        && flushed == 1
        && current_tag().is_none()
        && !manager.is_active()
}

fn scenario_c(tagger: &Tagger) -> bool {
    let service_a = tagger.service("serviceA");
    let service_b = tagger.service("serviceB");

    let inside = service_a.run("methodX", || {
        service_b.run("methodY", || snapshot().service().map(String::from))
    });

    inside.as_deref() == Some("serviceA.methodX") && snapshot().is_empty()
}

fn scenario_d(tagger: &Tagger) -> bool {
    let service = tagger.service("serviceA");
    let repo = tagger.data_access("repoB");
    let before = tagger
        .metrics()
        .intercepted_error_count(ErrorCategory::Persistence);

    let result: std::result::Result<(), io::Error> = service.invoke("methodX", || {
        repo.invoke("save", || {
            Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "database connection reset",
            ))
        })
    });

    let after = tagger
        .metrics()
        .intercepted_error_count(ErrorCategory::Persistence);

    matches!(&result, Err(e) if e.kind() == io::ErrorKind::ConnectionReset)
        && after - before == 1
        && snapshot().is_empty()
}

async fn scenario_async(tagger: &Arc<Tagger>, manager: LocalUnitOfWorkManager) -> bool {
    let mut handles = Vec::new();

    let calls = [
        ("orderService", "orderRepository", 20),
        ("billingService", "invoiceRepository", 21),
    ];

    for (service_name, repo_name, id) in calls {
        let service = tagger.service(service_name);
        let repo = tagger.data_access(repo_name);
        let listener = tagger.listener();

        handles.push(tokio::spawn(context::scope(async move {
            let session = WriteBehindSession::new(FlushMode::Deferred).with_listener(listener);
            let uow = manager.begin();

            let observed = service
                .invoke_async("submit", async {
                    repo.invoke_async("save", async {
                        tokio::task::yield_now().await;
                        session.create(&PurchaseOrder { id });
                        Ok::<_, io::Error>(tag_string())
                    })
                    .await
                })
                .await
                .ok()
                .flatten();

            tokio::task::yield_now().await;
            session.commit(uow);

            observed == Some(format!("{service_name}.submit.{repo_name}.save"))
                && current_tag().is_none()
        })));
    }

    let mut all_isolated = true;
    for handle in handles {
        all_isolated &= handle.await.unwrap_or(false);
    }
    all_isolated
}
