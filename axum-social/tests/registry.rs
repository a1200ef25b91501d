use std::sync::Arc;

use axum_social::{OAuthError, Provider, Providers, providers::Faux};

fn faux(name: &str) -> Faux {
    let mut faux = Faux::new();
    faux.set_name(name.to_owned());
    faux
}

#[test]
fn lookup() {
    let providers = Providers::new();
    providers.register(faux("faux"));
    providers.register(faux("other"));

    let found = providers.lookup("faux").unwrap();
    assert_eq!(found.name(), "faux");
    assert_eq!(providers.len(), 2);

    let mut names = providers.names();
    names.sort();
    assert_eq!(names, ["faux", "other"]);
}

#[test]
fn not_found() {
    let providers = Providers::new();

    let err = providers.lookup("unknown").err().unwrap();
    assert!(matches!(err, OAuthError::ProviderNotFound(_)));
    assert_eq!(err.to_string(), "no provider for unknown exists");
}

#[test]
fn last_registration_wins() {
    let providers = Providers::new();
    let first: Arc<dyn Provider> = Arc::new(faux("faux"));
    let second: Arc<dyn Provider> = Arc::new(faux("faux"));

    providers.register_arc(first);
    providers.register_arc(second.clone());

    assert_eq!(providers.len(), 1);
    assert!(Arc::ptr_eq(&providers.lookup("faux").unwrap(), &second));
}

#[test]
fn clear() {
    let providers = Providers::new();
    providers.register(faux("faux"));
    let shared = providers.clone();

    shared.clear();
    assert!(providers.is_empty());
    assert!(providers.list().is_empty());
    assert!(providers.lookup("faux").is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_access() {
    let providers = Providers::new();
    let mut handles = Vec::new();

    for i in 0..32 {
        let providers = providers.clone();
        handles.push(tokio::spawn(async move {
            let name = format!("faux-{i}");
            providers.register(faux(&name));
            providers.lookup(&name).map(|p| p.name().to_owned())
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap().unwrap(), format!("faux-{i}"));
    }
    assert_eq!(providers.len(), 32);
}
