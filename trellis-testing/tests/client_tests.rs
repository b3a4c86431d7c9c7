use serde::{Deserialize, Serialize};
use std::sync::Arc;
use trellis_core::*;
use trellis_testing::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Book {
    title: String,
}

struct Library {
    spy: Spy,
}

struct Harness {
    client: TestClient,
    spy: Spy,
    provider: Arc<CountingProvider<Container>>,
    reader: Arc<CountingReader>,
}

fn harness() -> Harness {
    let api = ResourceClass::interface("BookApi")
        .method(
            MethodDecl::new("find")
                .annotate(Annotation::get())
                .annotate(Annotation::path("{id}"))
                .annotate(Annotation::produces(["application/json"])),
        )
        .build();

    let library = ResourceClass::builder::<Library>()
        .annotate(Annotation::path("books"))
        .implements(api)
        .method(
            MethodDecl::new("find")
                .param(ParamDecl::new(ParamType::parsed::<u32>()).annotate(Annotation::path_param("id")))
                .handle(MethodHandle::on(|this: Arc<Library>, mut args| async move {
                    this.spy.record("find");
                    let id: u32 = args.take(0)?;
                    if id == 0 {
                        return Err(Error::NotFound("book 0".to_string()).into());
                    }
                    Ok(Reply::json(&Book { title: format!("Book {}", id) })?)
                })),
        )
        .method(
            MethodDecl::new("add")
                .annotate(Annotation::post())
                .annotate(Annotation::consumes(["application/json"]))
                .annotate(Annotation::produces(["application/json"]))
                .param(ParamDecl::new(ParamType::of::<Book>()))
                .handle(MethodHandle::on(|this: Arc<Library>, mut args| async move {
                    this.spy.record("add");
                    let book: Book = args.take(0)?;
                    Ok(Reply::json(&book)?)
                })),
        )
        .build();

    let spy = Spy::new();
    let container = Container::new();
    container.register(Library { spy: spy.clone() });
    let provider = Arc::new(CountingProvider::new(container));
    let reader = Arc::new(CountingReader::new(JsonReader::<Book>::new()));

    let client = TestClient::from_application(
        ResourceApplication::new()
            .application_path("api")
            .resource(library)
            .provider(provider.clone())
            .reader::<Book>(reader.clone()),
    )
    .unwrap();

    Harness {
        client,
        spy,
        provider,
        reader,
    }
}

#[tokio::test]
async fn test_get_with_inherited_annotations() {
    let h = harness();

    let response = h.client.get("/api/books/7").await;
    assert_status(&response, 200);
    assert_json_content_type(&response);
    assert_json(&response, &Book { title: "Book 7".to_string() });

    assert_eq!(h.spy.count_of("find"), 1);
    assert_eq!(h.provider.gets(), 1);
    assert!(h.provider.is_balanced());
    assert_eq!(h.reader.reads(), 0);
}

#[tokio::test]
async fn test_post_reads_entity_once() {
    let h = harness();

    let response = TestRequestBuilder::new(HttpMethod::POST, "/api/books")
        .json(&Book { title: "Dune".to_string() })
        .unwrap()
        .send(&h.client)
        .await;

    assert_status(&response, 200);
    assert_json(&response, &Book { title: "Dune".to_string() });
    assert_eq!(h.reader.reads(), 1);
    assert!(h.spy.was_called("add"));
    assert!(h.provider.is_balanced());
}

#[tokio::test]
async fn test_client_errors_never_reach_the_resource() {
    let h = harness();

    let response = h.client.get("/api/books/not-a-number").await;
    assert_status(&response, 400);
    assert_client_error(&response);

    let response = TestRequestBuilder::new(HttpMethod::POST, "/api/books")
        .content_type("text/plain")
        .body(b"Dune".to_vec())
        .send(&h.client)
        .await;
    assert_status(&response, 415);

    let response = TestRequestBuilder::new(HttpMethod::GET, "/api/books/1")
        .accept("text/html")
        .send(&h.client)
        .await;
    assert_status(&response, 406);

    let response = h.client.delete("/api/books/1").await;
    assert_status(&response, 405);

    let response = h.client.get("/api/shelves").await;
    assert_status(&response, 404);

    assert_eq!(h.spy.call_count(), 0);
    assert_eq!(h.reader.reads(), 0);
    assert!(h.provider.is_balanced());
}

#[tokio::test]
async fn test_error_from_resource_is_reported() {
    let h = harness();

    let response = h.client.get("/api/books/0").await;
    assert_status(&response, 404);
    assert_body_contains(&response, "book 0");
    assert_eq!(h.spy.count_of("find"), 1);
    assert!(h.provider.is_balanced());
}
