//! Subcommand implementations. Each image command runs inside
//! [`EditorContext::run_one`] so the event stream is always torn down.

use std::path::Path;

use anyhow::Context as _;
use serde_json::json;

use ea_client::{
    EditorContext, EraseMode, ImageOutParams, SegmentTarget, SkillOutcome, StateId, StateOutput,
};
use ea_domain::config::{Config, ConfigSeverity};

pub async fn credits(ctx: &EditorContext, json_output: bool) -> anyhow::Result<()> {
    let me = ctx.me().await?;
    let credits = me.credits.or(ctx.credits());
    if json_output {
        println!("{}", json!({ "credits": credits }));
    } else {
        match credits {
            Some(c) => println!("{c}"),
            None => println!("unknown"),
        }
    }
    Ok(())
}

pub async fn erase(
    ctx: &EditorContext,
    prompt: String,
    input: &Path,
    output: &Path,
    mode: EraseMode,
    seed: Option<u64>,
    json_output: bool,
) -> anyhow::Result<()> {
    let (file_name, data) = read_input(input)?;
    let result = ctx
        .run_one(|ctx| async move {
            let skills = ctx.skills();
            let image = ctx.upload_image(data, &file_name).await?;
            let mask = match segment_prompt(&ctx, &image, prompt).await? {
                SkillOutcome::Ok(mask) => mask,
                SkillOutcome::Failed(e) => return Ok(SkillOutcome::Failed(e)),
            };
            skills
                .erase(&image, &mask, mode, seed, Some(ImageOutParams::default()))
                .await
        })
        .await?;
    finish(ctx, result, output, json_output)
}

pub async fn cutout(
    ctx: &EditorContext,
    prompt: String,
    input: &Path,
    output: &Path,
    json_output: bool,
) -> anyhow::Result<()> {
    let (file_name, data) = read_input(input)?;
    let result = ctx
        .run_one(|ctx| async move {
            let image = ctx.upload_image(data, &file_name).await?;
            let mask = match segment_prompt(&ctx, &image, prompt).await? {
                SkillOutcome::Ok(mask) => mask,
                SkillOutcome::Failed(e) => return Ok(SkillOutcome::Failed(e)),
            };
            ctx.skills()
                .cutout(&image, &mask, Some(ImageOutParams::default()))
                .await
        })
        .await?;
    finish(ctx, result, output, json_output)
}

pub async fn upscale(
    ctx: &EditorContext,
    input: &Path,
    output: &Path,
    json_output: bool,
) -> anyhow::Result<()> {
    let (file_name, data) = read_input(input)?;
    let result = ctx
        .run_one(|ctx| async move {
            let image = ctx.upload_image(data, &file_name).await?;
            ctx.skills()
                .upscale(&image, Some(ImageOutParams::default()))
                .await
        })
        .await?;
    finish(ctx, result, output, json_output)
}

/// Print config issues; returns `false` when any is an error.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    let errors = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    for issue in &issues {
        println!("{issue}");
    }
    println!(
        "\n{errors} error(s), {} warning(s) in {config_path}",
        issues.len() - errors
    );
    errors == 0
}

pub fn show(config: &Config) -> anyhow::Result<()> {
    let mut shown = config.clone();
    if shown.editor.credentials.is_some() {
        shown.editor.credentials = Some("********".into());
    }
    print!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}

// ── helpers ─────────────────────────────────────────────────────────

fn read_input(path: &Path) -> anyhow::Result<(String, Vec<u8>)> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".into());
    Ok((file_name, data))
}

async fn segment_prompt(
    ctx: &EditorContext,
    image: &str,
    prompt: String,
) -> ea_domain::error::Result<SkillOutcome<StateId>> {
    let outcome = ctx
        .skills()
        .segment(image, SegmentTarget::Prompt(prompt), None, None)
        .await?;
    Ok(outcome.map(|mask| mask.state_id))
}

fn finish(
    ctx: &EditorContext,
    result: SkillOutcome<StateOutput>,
    output: &Path,
    json_output: bool,
) -> anyhow::Result<()> {
    let out = result.into_result()?;
    let image = out
        .image
        .context("server returned no image for the final state")?;
    std::fs::write(output, &image).with_context(|| format!("writing {}", output.display()))?;

    if json_output {
        println!(
            "{}",
            json!({
                "state_id": out.state_id,
                "output": output.display().to_string(),
                "bytes": image.len(),
                "credits": ctx.credits(),
            })
        );
    } else {
        println!("{} -> {}", out.state_id, output.display());
        if let Some(credits) = ctx.credits() {
            tracing::info!(credits, "credits left");
        }
    }
    Ok(())
}
