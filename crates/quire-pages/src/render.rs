//! Render contexts handed to the templating engine.

use std::path::PathBuf;

use serde::Serialize;

use quire_frontmatter::{FrontMatter, Iterators};

use crate::context::SiteContext;
use crate::page_view::{PageError, PageId, PageKind, PageView};
use crate::repeatable::ItemId;

/// Everything a template needs to render one output page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderContext {
    /// Page the output belongs to
    pub page: PageId,
    pub kind: PageKind,
    pub source: PathBuf,
    pub permalink: String,
    pub redirects: Vec<String>,
    pub target: PathBuf,
    /// Loop bindings for Repeater children
    pub iterators: Iterators,
    pub front_matter: FrontMatter,
    /// Item rendered by a Dynamic page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<ItemContext>,
    pub body: String,
}

/// The item part of a Dynamic page's render context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemContext {
    pub id: ItemId,
    pub name: String,
    pub source: PathBuf,
    pub front_matter: FrontMatter,
    pub body: String,
}

/// Build one render context per output of `page`.
///
/// Only Dynamic pages can fail here, one item at a time; the contexts of
/// the items that resolved are returned together with the errors.
pub fn render_contexts(page: &PageView, ctx: &SiteContext) -> (Vec<RenderContext>, Vec<PageError>) {
    match page.kind() {
        PageKind::Static => (static_contexts(page), Vec::new()),

        PageKind::Repeater => {
            let mut contexts = Vec::new();
            for child in page.children() {
                for mut context in static_contexts(child) {
                    context.kind = PageKind::Repeater;
                    contexts.push(context);
                }
            }
            (contexts, Vec::new())
        }

        PageKind::Dynamic => {
            let items = page.repeatable_items();
            let (outputs, errors) = page.item_outputs(ctx);

            let contexts = outputs
                .into_iter()
                .filter_map(|item_output| {
                    let item = items.iter().find(|item| *item.id() == item_output.item)?;
                    let output = item_output.output;

                    Some(RenderContext {
                        page: page.id().clone(),
                        kind: PageKind::Dynamic,
                        source: page.source().to_path_buf(),
                        permalink: output.permalink.canonical,
                        redirects: output.permalink.redirects,
                        target: output.target,
                        iterators: output.iterators,
                        front_matter: page.front_matter().clone(),
                        item: Some(ItemContext {
                            id: item.id().clone(),
                            name: item.name().to_string(),
                            source: item.source().to_path_buf(),
                            front_matter: item.front_matter().clone(),
                            body: item.body().to_string(),
                        }),
                        body: page.body().to_string(),
                    })
                })
                .collect();

            (contexts, errors)
        }
    }
}

fn static_contexts(page: &PageView) -> Vec<RenderContext> {
    page.outputs()
        .into_iter()
        .map(|output| RenderContext {
            page: page.id().clone(),
            kind: PageKind::Static,
            source: page.source().to_path_buf(),
            permalink: output.permalink.canonical.clone(),
            redirects: output.permalink.redirects.clone(),
            target: output.target.clone(),
            iterators: output.iterators.clone(),
            front_matter: page.front_matter().clone(),
            item: None,
            body: page.body().to_string(),
        })
        .collect()
}
