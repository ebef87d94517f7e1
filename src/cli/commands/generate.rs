//! Generate Command
//!
//! Run one route through the dispatcher from the command line.
//!
//! Usage:
//!   quillmind generate title --id 12 -n 3
//!   quillmind generate excerpt --content "..." --title "..."
//!   quillmind generate classify --id 12
//!   quillmind generate image --prompt "a lighthouse at dusk"
//!   quillmind generate term-cleanup --taxonomy post_tag

use console::style;

use crate::ai::provider::{Route, RouteArgs, RouteResult, Target};
use crate::cli::util::{CommandContext, Output, parse_feature, print_json};
use crate::dispatch::DispatchRequest;
use crate::types::{QuillError, Result};

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub route: String,
    pub feature: Option<String>,
    pub id: Option<u64>,
    pub content: Option<String>,
    pub title: Option<String>,
    pub prompt: Option<String>,
    pub taxonomy: Option<String>,
    pub num: Option<u32>,
    pub resize_type: Option<String>,
    pub size: Option<String>,
    pub quality: Option<String>,
    pub style: Option<String>,
    pub token: Option<String>,
    pub json: bool,
}

impl GenerateOptions {
    fn target(&self) -> Result<Target> {
        match (self.id, &self.prompt, &self.taxonomy) {
            (Some(id), None, None) => Ok(Target::Item(id)),
            (None, Some(prompt), None) => Ok(Target::Prompt(prompt.clone())),
            (None, None, Some(taxonomy)) => Ok(Target::Taxonomy(taxonomy.clone())),
            (None, None, None) => Ok(Target::Text),
            _ => Err(QuillError::InvalidParam(
                "Use only one of --id, --prompt or --taxonomy".to_string(),
            )),
        }
    }

    fn args(&self) -> RouteArgs {
        RouteArgs {
            num: self.num,
            content: self.content.clone(),
            title: self.title.clone(),
            resize_type: self.resize_type.clone(),
            size: self.size.clone(),
            quality: self.quality.clone(),
            style: self.style.clone(),
            format: None,
        }
    }

    fn request(&self) -> Result<DispatchRequest> {
        let mut request = DispatchRequest::new(Route::parse(&self.route), self.target()?)
            .with_args(self.args());
        if let Some(feature) = &self.feature {
            request = request.with_feature(parse_feature(feature)?);
        }
        Ok(request)
    }
}

pub async fn run(cmd: &CommandContext, opts: GenerateOptions) -> Result<()> {
    let request = opts.request()?;
    let actor = cmd.actor(opts.token.as_deref());
    let result = cmd.dispatcher().dispatch(&actor, request).await?;

    if opts.json {
        return print_json(&result);
    }
    render(&result);
    Ok(())
}

fn render(result: &RouteResult) {
    let out = Output::new();
    match result {
        RouteResult::Text(text) => println!("{}", text),
        RouteResult::Suggestions(items) => {
            for (i, item) in items.iter().enumerate() {
                println!("{} {}", style(format!("{}.", i + 1)).dim(), item);
            }
        }
        RouteResult::Terms { terms } => {
            for (taxonomy, ids) in terms {
                let ids: Vec<String> = ids.iter().map(u64::to_string).collect();
                println!("{}: {}", style(taxonomy).bold(), ids.join(", "));
            }
        }
        RouteResult::Images(images) => {
            for image in images {
                println!("{}", image.url);
            }
        }
        RouteResult::Browser(payload) => {
            out.info(&format!("Runs in the browser ({})", payload.func));
            out.section("Prompt");
            println!("{}", payload.prompt);
            out.section("Content");
            println!("{}", payload.content);
        }
        RouteResult::SimilarTerms(pairs) => {
            if pairs.is_empty() {
                out.info("No similar terms found");
            }
            for pair in pairs {
                println!(
                    "{} ↔ {}  {}",
                    pair.name,
                    pair.similar_name,
                    style(format!("{:.2}", pair.score)).dim()
                );
            }
        }
        RouteResult::Empty => out.warning("Route returned no result"),
    }
}
