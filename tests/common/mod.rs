#![allow(dead_code)]

use searchsync::config::{BackendConfig, BackendKind, DirectoryKind, MultiTenancyConfig};
use searchsync::model::{
    FieldHandle, IndexFieldAccessor, IndexObjectFieldAccessor, IndexSchema, IndexSchemaBuilder,
    ObjectFieldHandle, ObjectStorage,
};
use searchsync::{DocumentContributor, DocumentElement};
use std::path::Path;
use std::sync::Arc;

pub struct BookFields {
    pub title: FieldHandle<String>,
    pub pages: FieldHandle<i32>,
    pub authors: ObjectFieldHandle,
    pub author_name: FieldHandle<String>,
}

/// `books` with an analyzed title, a page count defaulting to -1 when null,
/// and nested authors.
pub fn books_schema() -> (IndexSchemaBuilder, BookFields) {
    let mut builder = IndexSchemaBuilder::new("books");
    let root = builder.root();
    let title = builder
        .field::<String>(&root, "title")
        .analyzer("standard")
        .handle();
    let pages = builder.field::<i32>(&root, "pages").index_null_as(-1).handle();
    let authors = builder.object_field(&root, "authors", ObjectStorage::Nested);
    let author_name = builder.field::<String>(&authors, "name").handle();
    (
        builder,
        BookFields {
            title,
            pages,
            authors,
            author_name,
        },
    )
}

#[derive(Debug, Clone, Default)]
pub struct Book {
    pub title: Option<&'static str>,
    pub pages: Option<i32>,
    /// `None` records the author list as explicitly missing.
    pub authors: Option<Vec<&'static str>>,
}

impl Book {
    pub fn titled(title: &'static str) -> Self {
        Book {
            title: Some(title),
            ..Book::default()
        }
    }
}

pub struct BookMapper {
    title: IndexFieldAccessor<String>,
    pages: IndexFieldAccessor<i32>,
    authors: IndexObjectFieldAccessor,
    author_name: IndexFieldAccessor<String>,
}

impl BookMapper {
    pub fn new(schema: &Arc<IndexSchema>, fields: &BookFields) -> Self {
        BookMapper {
            title: schema.accessor(&fields.title).unwrap(),
            pages: schema.accessor(&fields.pages).unwrap(),
            authors: schema.object_accessor(&fields.authors).unwrap(),
            author_name: schema.accessor(&fields.author_name).unwrap(),
        }
    }

    pub fn title_only(&self, title: &'static str) -> impl DocumentContributor + '_ {
        move |root: &mut dyn DocumentElement| self.title.write(root, Some(title.to_string()))
    }

    pub fn book(&self, book: Book) -> impl DocumentContributor + '_ {
        move |root: &mut dyn DocumentElement| {
            if let Some(title) = book.title {
                self.title.write(root, Some(title.to_string()));
            }
            self.pages.write(root, book.pages);
            match &book.authors {
                Some(authors) => {
                    for name in authors {
                        let author = self.authors.add(root);
                        self.author_name.write(author, Some(name.to_string()));
                    }
                }
                None => self.authors.add_missing(root),
            }
        }
    }
}

pub fn tantivy_config(root: Option<&Path>) -> BackendConfig {
    let mut config = BackendConfig {
        backend: BackendKind::Tantivy,
        ..BackendConfig::default()
    };
    config.tantivy.writer_heap_bytes = 15_000_000;
    config.tantivy.commit_interval_ms = 60_000;
    if let Some(root) = root {
        config.tantivy.directory = DirectoryKind::Filesystem;
        config.tantivy.root = Some(root.to_path_buf());
    }
    config
}

pub fn with_tenancy(mut config: BackendConfig) -> BackendConfig {
    config.multi_tenancy = MultiTenancyConfig::Discriminator;
    config
}
