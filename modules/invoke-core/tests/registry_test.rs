//! Integration tests for InvocationServices assembly and lookup.

use std::sync::Arc;

use invoke_common::{Graph, LatentsTensor, LibraryGraph};
use invoke_core::testing::{RecordingProcessor, TestServices};
use invoke_core::{
    InvocationProcessor, InvocationServices, InvocationServicesBuilder, ItemStorage, LatentsStorage,
    RegistryError, ServiceError,
};

fn same<T: ?Sized, U: ?Sized>(a: &Arc<T>, b: &Arc<U>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Builder with every service set except `skip`.
fn builder_without(t: &TestServices, processor: Arc<RecordingProcessor>, skip: &str) -> InvocationServicesBuilder {
    let mut b = InvocationServices::builder();
    if skip != "events" {
        b = b.events(t.events.clone());
    }
    if skip != "latents" {
        b = b.latents(t.latents.clone());
    }
    if skip != "images" {
        b = b.images(t.images.clone());
    }
    if skip != "metadata" {
        b = b.metadata(t.metadata.clone());
    }
    if skip != "queue" {
        b = b.queue(t.queue.clone());
    }
    if skip != "model_manager" {
        b = b.model_manager(t.model_manager.clone());
    }
    if skip != "restoration" {
        b = b.restoration(t.restoration.clone());
    }
    if skip != "urls" {
        b = b.urls(t.urls.clone());
    }
    if skip != "images_new" {
        b = b.images_new(t.images_new.clone());
    }
    if skip != "graph_library" {
        b = b.graph_library(t.graph_library.clone());
    }
    if skip != "graph_execution_manager" {
        b = b.graph_execution_manager(t.graph_execution_manager.clone());
    }
    if skip != "processor" {
        b = b.processor(processor);
    }
    b
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[test]
fn accessors_return_the_instances_passed_to_new() {
    let t = TestServices::new();
    let processor = Arc::new(RecordingProcessor::new());
    let services = t.build_with(processor.clone());

    assert!(same(services.events(), &t.events));
    assert!(same(services.latents(), &t.latents));
    assert!(same(services.images(), &t.images));
    assert!(same(services.metadata(), &t.metadata));
    assert!(same(services.queue(), &t.queue));
    assert!(same(services.model_manager(), &t.model_manager));
    assert!(same(services.restoration(), &t.restoration));
    assert!(same(services.urls(), &t.urls));
    assert!(same(services.images_new(), &t.images_new));
    assert!(same(services.graph_library(), &t.graph_library));
    assert!(same(services.graph_execution_manager(), &t.graph_execution_manager));
    assert!(same(services.processor(), &processor));
}

#[test]
fn builder_with_everything_matches_new() {
    let t = TestServices::new();
    let processor = Arc::new(RecordingProcessor::new());
    let services = builder_without(&t, processor.clone(), "").build().unwrap();

    assert!(same(services.images(), &t.images));
    assert!(same(services.images_new(), &t.images_new));
    assert!(same(services.processor(), &processor));
}

#[test]
fn builder_names_each_missing_service() {
    let t = TestServices::new();
    for name in InvocationServices::SERVICE_NAMES {
        let result = builder_without(&t, Arc::new(RecordingProcessor::new()), name).build();
        assert_eq!(
            result.err(),
            Some(RegistryError::MissingService(name)),
            "expected {name} to be reported missing"
        );
    }
}

#[test]
fn empty_builder_reports_a_missing_service() {
    let err = InvocationServices::builder().build().err().unwrap();
    assert_eq!(err.to_string(), "missing service: events");
}

#[test]
fn builder_logger_defaults_to_named_span() {
    let t = TestServices::new();
    tracing::subscriber::with_default(tracing_subscriber::registry(), || {
        let services = t.builder().processor(Arc::new(RecordingProcessor::new())).build().unwrap();
        let name = services.logger().metadata().map(|m| m.name());
        assert_eq!(name, Some("invocation_services"));
    });
}

#[test]
fn builder_keeps_supplied_logger() {
    let t = TestServices::new();
    let services = t
        .builder()
        .processor(Arc::new(RecordingProcessor::new()))
        .logger(tracing::Span::none())
        .build()
        .unwrap();

    assert!(services.logger().is_none());
}

#[test]
fn images_and_images_new_stay_distinct() {
    let t = TestServices::new();
    let services = t.build_with(Arc::new(RecordingProcessor::new()));
    assert!(!same(services.images(), services.images_new()));
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

#[test]
fn repeated_reads_return_the_same_instance() {
    let t = TestServices::new();
    let services = t.build_with(Arc::new(RecordingProcessor::new()));

    assert!(same(services.latents(), services.latents()));
    assert!(same(services.queue(), services.queue()));
    assert!(same(services.graph_library(), services.graph_library()));
}

#[test]
fn clones_share_every_service() {
    let t = TestServices::new();
    let services = t.build_with(Arc::new(RecordingProcessor::new()));
    let copy = services.clone();

    assert!(same(services.events(), copy.events()));
    assert!(same(services.model_manager(), copy.model_manager()));
    assert!(same(services.processor(), copy.processor()));
}

#[tokio::test]
async fn concurrent_readers_see_the_same_services() {
    let t = TestServices::new();
    let services = Arc::new(t.build_with(Arc::new(RecordingProcessor::new())));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let services = services.clone();
            tokio::spawn(async move {
                (
                    Arc::as_ptr(services.latents()) as *const () as usize,
                    Arc::as_ptr(services.graph_execution_manager()) as *const () as usize,
                )
            })
        })
        .collect();

    let seen = futures::future::join_all(handles).await;
    let expected = (
        Arc::as_ptr(&t.latents) as *const () as usize,
        Arc::as_ptr(&t.graph_execution_manager) as *const () as usize,
    );
    for result in seen {
        assert_eq!(result.unwrap(), expected);
    }
}

#[tokio::test]
async fn writes_through_registry_land_in_the_shared_collaborator() {
    let t = TestServices::new();
    let services = t.build_with(Arc::new(RecordingProcessor::new()));

    services
        .latents()
        .save("noise", LatentsTensor::zeros(vec![1, 4, 8, 8]).unwrap())
        .await
        .unwrap();
    assert_eq!(t.latents.get("noise").await.unwrap().len(), 256);

    let library = LibraryGraph::new("txt2img", Graph::new());
    let id = library.id.clone();
    services.graph_library().set(library).await.unwrap();
    assert!(t.graph_library.get(&id).await.unwrap().is_some());
}

// ---------------------------------------------------------------------------
// Processor attach
// ---------------------------------------------------------------------------

#[tokio::test]
async fn processor_starts_with_the_registry_that_holds_it() {
    let t = TestServices::new();
    let processor = Arc::new(RecordingProcessor::new());
    let services = Arc::new(t.build_with(processor.clone()));

    services.processor().start(services.clone()).unwrap();
    assert!(processor.is_running());
    assert!(Arc::ptr_eq(&processor.attached().unwrap(), &services));

    assert!(matches!(
        services.processor().start(services.clone()),
        Err(ServiceError::AlreadyRunning)
    ));
    assert_eq!(processor.starts(), 1);

    services.processor().stop().await;
    services.processor().stop().await;
    assert!(!processor.is_running());
    assert_eq!(processor.stops(), 1);
}
