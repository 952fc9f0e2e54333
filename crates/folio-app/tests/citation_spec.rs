//! Cited-page PDF reconstruction from citation tokens.

mod support;

use bytes::Bytes;
use chrono::NaiveDate;

use folio_app::model::{Context, FileRecord};
use folio_app::pdf::page_count;
use folio_app::services::blob_key;
use folio_app::services::citation::CitationError;
use folio_app::stores::blob::content_hash;
use folio_app::stores::{BlobMetadata, BlobStore, DocumentStore};

use support::{ScriptedChat, StaticLayout, TestStack, build_stack, sample_pdf};

fn stack() -> TestStack {
    build_stack(
        std::sync::Arc::new(StaticLayout),
        std::sync::Arc::new(ScriptedChat::new("unused", Vec::new())),
    )
}

/// Store a file record with its page count already known, plus its blob.
async fn stage_file(stack: &TestStack, context: &mut Context, pages: usize) -> FileRecord {
    let pdf = sample_pdf(pages);
    let hash = content_hash(&pdf);
    let mut file = FileRecord::new(&context.id, format!("doc{pages}.pdf"), hash);
    file.pages = pages;
    context.files.push(file.id.clone());
    stack.docs.put_file(&file).await.unwrap();
    let key = blob_key(&context.id, &file.hash, &file.name);
    stack
        .blobs
        .put(&key, Bytes::from(pdf), BlobMetadata::new())
        .await
        .unwrap();
    file
}

async fn stage_context(stack: &TestStack, page_counts: &[usize]) -> (Context, Vec<FileRecord>) {
    let mut context = Context::new(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    let mut files = Vec::new();
    for &pages in page_counts {
        files.push(stage_file(stack, &mut context, pages).await);
    }
    stack.docs.put_context(&context).await.unwrap();
    (context, files)
}

#[tokio::test]
async fn interior_citation_brings_both_neighbours() {
    let stack = stack();
    let (context, files) = stage_context(&stack, &[10]).await;

    let fonts = vec![format!("5-{}-0", files[0].id)];
    let pdf = stack.citations.cited_pdf(&context.id, &fonts).await.unwrap();
    // Pages 4, 5, and 6.
    assert_eq!(page_count(&pdf).unwrap(), 3);
}

#[tokio::test]
async fn edge_citations_clamp_to_the_document() {
    let stack = stack();
    let (context, files) = stage_context(&stack, &[10]).await;

    let first = vec![format!("0-{}-0", files[0].id)];
    let pdf = stack.citations.cited_pdf(&context.id, &first).await.unwrap();
    assert_eq!(page_count(&pdf).unwrap(), 2);

    let last = vec![format!("9-{}-0", files[0].id)];
    let pdf = stack.citations.cited_pdf(&context.id, &last).await.unwrap();
    assert_eq!(page_count(&pdf).unwrap(), 2);
}

#[tokio::test]
async fn overlapping_citations_are_unioned_per_file() {
    let stack = stack();
    let (context, files) = stage_context(&stack, &[10]).await;

    // Pages 2..=5 once each, not twice.
    let fonts = vec![
        format!("3-{}-0", files[0].id),
        format!("4-{}-1", files[0].id),
    ];
    let pdf = stack.citations.cited_pdf(&context.id, &fonts).await.unwrap();
    assert_eq!(page_count(&pdf).unwrap(), 4);
}

#[tokio::test]
async fn citations_across_files_merge_into_one_document() {
    let stack = stack();
    let (context, files) = stage_context(&stack, &[10, 5]).await;

    let fonts = vec![
        format!("5-{}-0", files[0].id),
        format!("0-{}-0", files[1].id),
    ];
    let pdf = stack.citations.cited_pdf(&context.id, &fonts).await.unwrap();
    // Three pages from the first file, two from the second.
    assert_eq!(page_count(&pdf).unwrap(), 5);
}

#[tokio::test]
async fn malformed_tokens_fail_the_whole_request() {
    let stack = stack();
    let (context, files) = stage_context(&stack, &[10]).await;

    let fonts = vec![format!("5-{}-0", files[0].id), "5--0".to_string()];
    let err = stack
        .citations
        .cited_pdf(&context.id, &fonts)
        .await
        .unwrap_err();
    assert!(matches!(err, CitationError::Malformed(_)));
}

#[tokio::test]
async fn foreign_files_are_dropped_and_may_leave_an_empty_document() {
    let stack = stack();
    let (context, _files) = stage_context(&stack, &[10]).await;

    let fonts = vec!["0-file_feedf00d-0".to_string()];
    let pdf = stack.citations.cited_pdf(&context.id, &fonts).await.unwrap();
    assert_eq!(page_count(&pdf).unwrap(), 0);
}

#[tokio::test]
async fn unknown_context_is_not_found() {
    let stack = stack();
    let err = stack
        .citations
        .cited_pdf("ctx_00000000", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, CitationError::ContextNotFound(_)));
}
