//! End-to-end runs through `TaskRegistry::run` with a scripted backend.
//!
//! Every generative task is exercised once on its happy path, plus the failure
//! modes each strategy can produce.

mod common;

use common::{registry, ScriptedBackend, PDF, PNG};
use pretty_assertions::assert_eq;
use serde_json::json;
use toolflow::contract::DataUri;
use toolflow::invoker::{GenerateResponse, Modality};
use toolflow::template::Part;
use toolflow::{Boundary, InvocationError, TaskError};

#[tokio::test]
async fn lorem_ipsum_returns_backend_text() {
    let backend = ScriptedBackend::replying(GenerateResponse::structured(
        json!({"text": "Lorem ipsum"}),
    ));
    let registry = registry(backend.clone());

    let output = registry
        .run("generate-lorem-ipsum", json!({"count": 2, "type": "words"}))
        .await
        .unwrap();

    assert_eq!(output, json!({"text": "Lorem ipsum"}));
    let request = backend.last_request().unwrap();
    assert_eq!(request.modality, Modality::Structured);
    assert!(request.parts.text().contains("exactly 2 words"));
    assert_eq!(request.output_schema["required"], json!(["text"]));
}

#[tokio::test]
async fn minify_with_no_backend_output_is_empty_result() {
    let backend = ScriptedBackend::replying(GenerateResponse::empty());
    let registry = registry(backend.clone());

    let err = registry
        .run("minify-code", json!({"code": "", "language": "html"}))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TaskError::Invocation(InvocationError::EmptyResult(_))
    ));
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn input_violations_never_reach_the_backend() {
    let backend = ScriptedBackend::replying(GenerateResponse::structured(json!({"text": "x"})));
    let registry = registry(backend.clone());

    let cases = [
        ("generate-lorem-ipsum", json!({"count": 0, "type": "words"}), "count"),
        ("generate-lorem-ipsum", json!({"count": 2, "type": "letters"}), "type"),
        ("format-code", json!({"code": "a", "language": "python"}), "language"),
        ("extract-text-from-image", json!({"image": "hello"}), "image"),
        ("extract-text-from-pdf", json!({"pdf": PNG}), "pdf"),
        ("translate-document", json!({"document": PDF}), "targetLanguage"),
        ("generate-mock-data", json!({"count": 5}), "description"),
        ("compress-image", json!({"image": PNG, "quality": 101}), "quality"),
    ];
    for (task, input, field) in cases {
        let err = registry.run(task, input).await.unwrap_err();
        let contract = err
            .as_contract()
            .unwrap_or_else(|| panic!("{task}: expected contract error, got {err:?}"));
        assert_eq!(contract.boundary, Boundary::Input, "{task}");
        assert_eq!(contract.field, field, "{task}");
    }
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn non_object_input_is_rejected_at_the_root() {
    let backend = ScriptedBackend::replying(GenerateResponse::empty());
    let err = registry(backend.clone())
        .run("format-code", json!("function(){}"))
        .await
        .unwrap_err();
    assert_eq!(err.as_contract().unwrap().field, "$");
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn malformed_backend_output_is_never_forwarded() {
    let backend = ScriptedBackend::replying(GenerateResponse::structured(
        json!({"formatted": "let a = 1;"}),
    ));
    let err = registry(backend)
        .run("format-code", json!({"code": "let a=1", "language": "javascript"}))
        .await
        .unwrap_err();

    let contract = err.as_contract().unwrap();
    assert_eq!(contract.boundary, Boundary::Output);
    assert_eq!(contract.field, "formattedCode");
}

#[tokio::test]
async fn non_json_backend_text_fails_the_output_contract() {
    let backend = ScriptedBackend::replying(GenerateResponse::structured(json!(
        "Here is your lorem ipsum!"
    )));
    let err = registry(backend)
        .run("generate-lorem-ipsum", json!({"count": 1, "type": "sentences"}))
        .await
        .unwrap_err();
    let contract = err.as_contract().unwrap();
    assert_eq!(contract.boundary, Boundary::Output);
    assert_eq!(contract.field, "$");
}

#[tokio::test]
async fn backend_failures_pass_through_unchanged() {
    let backend = ScriptedBackend::failing(InvocationError::UpstreamRejected("SAFETY".into()));
    let err = registry(backend)
        .run("extract-text-from-image", json!({"image": PNG}))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TaskError::Invocation(InvocationError::UpstreamRejected("SAFETY".into()))
    );
}

#[tokio::test]
async fn extract_text_from_image_sends_the_image() {
    let backend = ScriptedBackend::replying(GenerateResponse::structured(
        json!({"text": "STOP"}),
    ));
    let output = registry(backend.clone())
        .run("extract-text-from-image", json!({"image": PNG}))
        .await
        .unwrap();

    assert_eq!(output, json!({"text": "STOP"}));
    let request = backend.last_request().unwrap();
    assert_eq!(
        request.parts.media().collect::<Vec<_>>(),
        vec![&DataUri::parse(PNG).unwrap()]
    );
}

#[tokio::test]
async fn extract_text_from_pdf_accepts_empty_text() {
    let backend = ScriptedBackend::replying(GenerateResponse::structured(json!({"text": ""})));
    let output = registry(backend)
        .run("extract-text-from-pdf", json!({"pdf": PDF}))
        .await
        .unwrap();
    assert_eq!(output, json!({"text": ""}));
}

#[tokio::test]
async fn compress_image_wraps_the_media_reply() {
    let compressed = DataUri::parse("data:image/jpeg;base64,/9j/4A==").unwrap();
    let backend = ScriptedBackend::replying(GenerateResponse::media(compressed));
    let output = registry(backend.clone())
        .run("compress-image", json!({"image": PNG}))
        .await
        .unwrap();

    assert_eq!(
        output,
        json!({"compressedImage": "data:image/jpeg;base64,/9j/4A=="})
    );
    let request = backend.last_request().unwrap();
    assert_eq!(request.modality, Modality::Media);
    assert!(request.parts.text().contains("quality 75 out of 100"));
    assert!(matches!(request.parts.parts().last(), Some(Part::Media(_))));
}

#[tokio::test]
async fn compress_image_rejects_non_image_media() {
    let pdf = DataUri::parse(PDF).unwrap();
    let err = registry(ScriptedBackend::replying(GenerateResponse::media(pdf)))
        .run("compress-image", json!({"image": PNG, "quality": 10}))
        .await
        .unwrap_err();
    let contract = err.as_contract().unwrap();
    assert_eq!(contract.boundary, Boundary::Output);
    assert_eq!(contract.field, "compressedImage");
}

#[tokio::test]
async fn compress_image_without_media_is_empty() {
    let backend = ScriptedBackend::replying(GenerateResponse::structured(
        json!({"compressedImage": PNG}),
    ));
    let err = registry(backend)
        .run("compress-image", json!({"image": PNG}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "empty_result");
}

#[tokio::test]
async fn mock_data_returns_records() {
    let backend = ScriptedBackend::replying(GenerateResponse::structured(json!({
        "data": [{"name": "Ada"}, {"name": "Alan"}]
    })));
    let output = registry(backend.clone())
        .run(
            "generate-mock-data",
            json!({"description": "people", "count": 2, "examples": ["{\"name\":\"Grace\"}"]}),
        )
        .await
        .unwrap();

    assert_eq!(output["data"].as_array().map(Vec::len), Some(2));
    assert!(backend
        .last_request()
        .unwrap()
        .parts
        .text()
        .contains("- {\"name\":\"Grace\"}"));
}

#[tokio::test]
async fn translate_document_returns_translation() {
    let backend = ScriptedBackend::replying(GenerateResponse::structured(
        json!({"translatedText": "Hello world"}),
    ));
    let output = registry(backend)
        .run(
            "translate-document",
            json!({
                "document": "data:text/plain;base64,SGFsbG8gV2VsdA==",
                "targetLanguage": "English",
                "sourceLanguage": "German"
            }),
        )
        .await
        .unwrap();
    assert_eq!(output, json!({"translatedText": "Hello world"}));
}

#[tokio::test]
async fn unknown_tasks_are_reported_by_name() {
    let backend = ScriptedBackend::replying(GenerateResponse::empty());
    let err = registry(backend.clone())
        .run("resize-image", json!({}))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TaskError::UnknownTask {
            name: "resize-image".into()
        }
    );
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn extra_input_fields_are_ignored() {
    let backend = ScriptedBackend::replying(GenerateResponse::structured(
        json!({"formattedCode": "a {\n  b: c;\n}", "note": "extra"}),
    ));
    let output = registry(backend)
        .run(
            "format-code",
            json!({"code": "a{b:c}", "language": "css", "indent": 4}),
        )
        .await
        .unwrap();
    assert_eq!(output, json!({"formattedCode": "a {\n  b: c;\n}"}));
}
