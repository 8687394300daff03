//! `muse templates`: catalog inspection

use anyhow::Result;
use clap::Args;
use prompts::{list_template_files, PromptCatalog};

use crate::{config::Config, output::OutputHandler};

#[derive(Debug, Args)]
pub struct TemplatesArgs {
    /// Catalog file to describe; lists catalog files when omitted
    pub file: Option<String>,
}

pub async fn templates(args: TemplatesArgs, config: &Config, output: &OutputHandler) -> Result<()> {
    let prompts_dir = &config.paths.prompts_dir;

    let Some(file) = args.file else {
        let files = list_template_files(prompts_dir)?;
        output.print_file_list(
            &format!("Template files in {}", prompts_dir.display()),
            &files,
        );
        return Ok(());
    };

    let path = PromptCatalog::resolve_path(prompts_dir, Some(&file));
    let catalog = PromptCatalog::load(&path).await?;

    output.print_header(&format!("Templates in {}", path.display()));
    let templates: Vec<_> = catalog
        .template_names()
        .into_iter()
        .filter_map(|name| {
            let info = catalog.template_info(&name)?;
            Some((name, info.description.clone(), info.localized_description.clone()))
        })
        .collect();
    output.print_templates_table(&templates);

    output.print_header("Element categories");
    let categories: Vec<_> = catalog
        .element_names()
        .into_iter()
        .filter_map(|name| {
            let element = catalog.element(&name)?;
            Some((name, element.values.len(), element.description.clone()))
        })
        .collect();
    output.print_categories_table(&categories);

    Ok(())
}
