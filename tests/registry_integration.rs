use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use docintel::llm::{
    GenerationOptions, GenerationProvider, MockProvider, ProviderRegistry, RegistryError,
};

fn shared(mock: &Arc<MockProvider>) -> Arc<dyn GenerationProvider> {
    Arc::clone(mock) as Arc<dyn GenerationProvider>
}

#[tokio::test]
async fn test_failover_returns_fallback_output() {
    let primary = Arc::new(MockProvider::new("primary"));
    let fallback = Arc::new(MockProvider::new("fallback").with_reply("from fallback"));
    primary.push_error("primary exploded");

    let registry = ProviderRegistry::with_selection(
        vec![shared(&primary), shared(&fallback)],
        Some("primary"),
        Some("fallback"),
    )
    .unwrap();

    let text = registry
        .generate("hello", &GenerationOptions::default())
        .await
        .unwrap();
    assert_eq!(text, "from fallback");
    assert_eq!(primary.call_count(), 1);
    assert_eq!(fallback.call_count(), 1);
    assert_eq!(registry.active_name().as_deref(), Some("primary"));
}

#[tokio::test]
async fn test_both_failing_surfaces_fallback_error() {
    let primary = Arc::new(MockProvider::new("primary"));
    let fallback = Arc::new(MockProvider::new("fallback"));
    primary.push_error("primary exploded");
    fallback.push_error("fallback exploded");

    let registry = ProviderRegistry::with_selection(
        vec![shared(&primary), shared(&fallback)],
        Some("primary"),
        Some("fallback"),
    )
    .unwrap();

    let err = registry
        .generate("hello", &GenerationOptions::default())
        .await
        .unwrap_err();
    match err {
        RegistryError::Generation(e) => {
            assert_eq!(e.provider(), "fallback");
            assert!(e.to_string().contains("fallback exploded"));
        }
        other => panic!("unexpected error: {other}"),
    }
    // One hop only
    assert_eq!(primary.call_count(), 1);
    assert_eq!(fallback.call_count(), 1);
}

#[tokio::test]
async fn test_unavailable_active_primary_fails_over_without_switching() {
    let primary = Arc::new(MockProvider::new("primary"));
    let fallback = Arc::new(MockProvider::new("fallback").with_reply("ok"));

    let registry = ProviderRegistry::initialize(
        vec![shared(&primary), shared(&fallback)],
        Some("primary"),
        Some("fallback"),
    )
    .await;
    assert_eq!(registry.active_name().as_deref(), Some("primary"));

    // Primary goes down after startup
    primary.set_available(false);

    let text = registry
        .generate("hello", &GenerationOptions::default())
        .await
        .unwrap();
    assert_eq!(text, "ok");
    assert_eq!(registry.active_name().as_deref(), Some("primary"));
}

#[tokio::test]
async fn test_scoped_switch_restores_on_success_and_failure() {
    let a = Arc::new(MockProvider::new("a"));
    let b = Arc::new(MockProvider::new("b"));
    let registry =
        ProviderRegistry::with_selection(vec![shared(&a), shared(&b)], Some("a"), None).unwrap();

    {
        let _guard = registry.scoped_switch("b").await.unwrap();
        assert_eq!(registry.active_name().as_deref(), Some("b"));
        registry
            .generate("x", &GenerationOptions::default())
            .await
            .unwrap();
    }
    assert_eq!(registry.active_name().as_deref(), Some("a"));
    assert_eq!(b.call_count(), 1);

    b.push_error("boom");
    let result: Result<String, RegistryError> = async {
        let _guard = registry.scoped_switch("b").await?;
        registry.generate("y", &GenerationOptions::default()).await
    }
    .await;
    assert!(result.is_err());
    assert_eq!(registry.active_name().as_deref(), Some("a"));

    assert!(matches!(
        registry.scoped_switch("missing").await,
        Err(RegistryError::ProviderNotFound(_))
    ));
    assert_eq!(registry.active_name().as_deref(), Some("a"));
}

#[tokio::test]
async fn test_scoped_switch_restores_on_panic() {
    let registry = Arc::new(
        ProviderRegistry::with_selection(
            vec![
                Arc::new(MockProvider::new("a")) as Arc<dyn GenerationProvider>,
                Arc::new(MockProvider::new("b")) as Arc<dyn GenerationProvider>,
            ],
            Some("a"),
            None,
        )
        .unwrap(),
    );

    let inner = Arc::clone(&registry);
    let outcome = tokio::spawn(async move {
        let _guard = inner.scoped_switch("b").await.unwrap();
        panic!("processing blew up");
    })
    .await;
    assert!(outcome.unwrap_err().is_panic());
    assert_eq!(registry.active_name().as_deref(), Some("a"));

    // The exclusive lock was released during unwinding
    let guard = registry.scoped_switch("b").await.unwrap();
    assert_eq!(registry.active_name().as_deref(), Some("b"));
    drop(guard);
    assert_eq!(registry.active_name().as_deref(), Some("a"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_scoped_switches_restore_original() {
    let names = ["a", "x", "y", "z"];
    let registry = Arc::new(
        ProviderRegistry::with_selection(
            names
                .iter()
                .map(|n| Arc::new(MockProvider::new(*n)) as Arc<dyn GenerationProvider>)
                .collect(),
            Some("a"),
            None,
        )
        .unwrap(),
    );

    let tasks: Vec<_> = (0..24)
        .map(|i| {
            let registry = Arc::clone(&registry);
            let target = names[1 + i % 3];
            tokio::spawn(async move {
                let _guard = registry.scoped_switch(target).await.unwrap();
                tokio::task::yield_now().await;
                assert_eq!(registry.active_name().as_deref(), Some(target));
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(registry.active_name().as_deref(), Some("a"));
}

#[test]
fn test_concurrent_readers_only_see_assigned_names() {
    let names = ["a", "b", "c"];
    let registry = Arc::new(
        ProviderRegistry::with_selection(
            names
                .iter()
                .map(|n| Arc::new(MockProvider::new(*n)) as Arc<dyn GenerationProvider>)
                .collect(),
            Some("a"),
            None,
        )
        .unwrap(),
    );
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let name = registry.active_name();
                    assert!(matches!(name.as_deref(), Some("a" | "b" | "c")));
                }
            })
        })
        .collect();

    for i in 0..2_000 {
        registry.switch_active(names[i % names.len()]).unwrap();
    }
    stop.store(true, Ordering::Relaxed);

    for reader in readers {
        reader.join().expect("reader observed an unassigned provider name");
    }
}
