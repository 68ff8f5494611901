//! Typed wrappers over [`EditorContext::call_skill`].
//!
//! Each wrapper only differs in its endpoint path, its parameter shape, and
//! how it reads the resulting state metadata. A `ko` job becomes
//! [`SkillOutcome::Failed`]; transport and stream failures stay `Err`.

use std::time::Duration;

use ea_domain::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::context::EditorContext;
use crate::types::{BBox, ErrorResult, ImageOutParams, JobStatus, SkillOutcome, StateId};

/// Upscaling routinely takes minutes.
const UPSCALE_MIN_TIMEOUT: Duration = Duration::from_secs(300);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EraseMode {
    Express,
    #[default]
    Standard,
    Premium,
    Free,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeOperation {
    Union,
    Difference,
    Intersection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskQuality {
    Low,
    High,
}

/// What `segment` should isolate.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentTarget {
    Bbox(BBox),
    Prompt(String),
    /// Use the bbox or prompt already stored in the state's metadata.
    FromMeta,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ShadowParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<(u32, u32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlendParams {
    pub bbox: BBox,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub flip: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_angle: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<EraseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl BlendParams {
    pub fn at(bbox: BBox) -> Self {
        Self {
            bbox,
            flip: false,
            rotation_angle: None,
            mode: None,
            seed: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An image-producing skill's output state, plus its pixels when requested.
#[derive(Debug, Clone, PartialEq)]
pub struct StateOutput {
    pub state_id: StateId,
    pub image: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductName {
    pub state_id: StateId,
    pub product_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxOutput {
    pub state_id: StateId,
    pub bbox: BBox,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectedObject {
    pub bbox: BBox,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectOutput {
    pub state_id: StateId,
    pub results: Vec<DetectedObject>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Skills
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Borrowed view over a session; get one with [`EditorContext::skills`].
#[derive(Debug, Clone, Copy)]
pub struct Skills<'a> {
    ctx: &'a EditorContext,
}

impl<'a> Skills<'a> {
    pub(crate) fn new(ctx: &'a EditorContext) -> Self {
        Self { ctx }
    }

    pub async fn infer_product_name(&self, state_id: &str) -> Result<SkillOutcome<ProductName>> {
        let outcome = self
            .with_meta(&format!("infer-product-name/{state_id}"), Value::Null, None)
            .await?;
        outcome_try_map(outcome, |(state_id, meta)| {
            let product_name = meta_field::<String>(&meta, "product_name")?;
            Ok(ProductName {
                state_id,
                product_name,
            })
        })
    }

    /// Without `product_name` the server infers it first.
    pub async fn infer_bbox(
        &self,
        state_id: &str,
        product_name: Option<&str>,
    ) -> Result<SkillOutcome<BoxOutput>> {
        let params = match product_name {
            Some(name) => json!({ "product_name": name }),
            None => Value::Null,
        };
        let outcome = self
            .with_meta(&format!("infer-bbox/{state_id}"), params, None)
            .await?;
        outcome_try_map(outcome, |(state_id, meta)| {
            let bbox = meta_field::<BBox>(&meta, "bbox")?;
            Ok(BoxOutput { state_id, bbox })
        })
    }

    pub async fn detect(&self, state_id: &str, prompt: &str) -> Result<SkillOutcome<DetectOutput>> {
        let outcome = self
            .with_meta(&format!("detect/{state_id}"), json!({ "prompt": prompt }), None)
            .await?;
        outcome_try_map(outcome, |(state_id, meta)| {
            let results = meta_field::<Vec<DetectedObject>>(&meta, "results")?;
            Ok(DetectOutput { state_id, results })
        })
    }

    pub async fn segment(
        &self,
        state_id: &str,
        target: SegmentTarget,
        mask_quality: Option<MaskQuality>,
        with_image: Option<ImageOutParams>,
    ) -> Result<SkillOutcome<StateOutput>> {
        let mut params = Map::new();
        match target {
            SegmentTarget::Bbox(bbox) => {
                params.insert("bbox".into(), json!(bbox));
            }
            SegmentTarget::Prompt(prompt) => {
                params.insert("prompt".into(), Value::String(prompt));
            }
            SegmentTarget::FromMeta => {}
        }
        if let Some(quality) = mask_quality {
            params.insert("mask_quality".into(), json!(quality));
        }
        self.image_step(
            format!("segment/{state_id}"),
            Value::Object(params),
            with_image,
            None,
        )
        .await
    }

    pub async fn merge_masks(
        &self,
        operation: MergeOperation,
        states: &[StateId],
        with_image: Option<ImageOutParams>,
    ) -> Result<SkillOutcome<StateOutput>> {
        if states.len() < 2 {
            return Err(Error::Config("merge_masks needs at least two masks".into()));
        }
        self.image_step(
            "merge-masks".into(),
            json!({ "operation": operation, "states": states }),
            with_image,
            None,
        )
        .await
    }

    pub async fn erase(
        &self,
        image: &str,
        mask: &str,
        mode: EraseMode,
        seed: Option<u64>,
        with_image: Option<ImageOutParams>,
    ) -> Result<SkillOutcome<StateOutput>> {
        let mut params = json!({ "mode": mode });
        if let Some(seed) = seed {
            params["seed"] = json!(seed);
        }
        self.image_step(format!("erase/{image}/{mask}"), params, with_image, None)
            .await
    }

    pub async fn cutout(
        &self,
        image: &str,
        mask: &str,
        with_image: Option<ImageOutParams>,
    ) -> Result<SkillOutcome<StateOutput>> {
        self.image_step(format!("cutout/{image}/{mask}"), Value::Null, with_image, None)
            .await
    }

    /// `color` is a CSS-style hex string such as `#ff0000`.
    pub async fn recolor(
        &self,
        image: &str,
        mask: &str,
        color: &str,
        with_image: Option<ImageOutParams>,
    ) -> Result<SkillOutcome<StateOutput>> {
        self.image_step(
            format!("recolor/{image}/{mask}"),
            json!({ "color": color }),
            with_image,
            None,
        )
        .await
    }

    pub async fn shadow(
        &self,
        cutout: &str,
        params: &ShadowParams,
        with_image: Option<ImageOutParams>,
    ) -> Result<SkillOutcome<StateOutput>> {
        let params = serde_json::to_value(params)?;
        self.image_step(format!("shadow/{cutout}"), params, with_image, None)
            .await
    }

    pub async fn blend(
        &self,
        scene: &str,
        cutout: &str,
        params: &BlendParams,
        with_image: Option<ImageOutParams>,
    ) -> Result<SkillOutcome<StateOutput>> {
        let params = serde_json::to_value(params)?;
        self.image_step(
            format!("blend/{scene}/{cutout}"),
            params,
            with_image,
            None,
        )
        .await
    }

    pub async fn upscale(
        &self,
        state_id: &str,
        with_image: Option<ImageOutParams>,
    ) -> Result<SkillOutcome<StateOutput>> {
        let timeout = self.ctx.config().timeout().max(UPSCALE_MIN_TIMEOUT);
        self.image_step(
            format!("upscale/{state_id}"),
            Value::Null,
            with_image,
            Some(timeout),
        )
        .await
    }

    pub async fn set_background_color(
        &self,
        state_id: &str,
        background: &str,
        with_image: Option<ImageOutParams>,
    ) -> Result<SkillOutcome<StateOutput>> {
        self.image_step(
            format!("set-background-color/{state_id}"),
            json!({ "background": background }),
            with_image,
            None,
        )
        .await
    }

    pub async fn crop(
        &self,
        state_id: &str,
        bbox: BBox,
        with_image: Option<ImageOutParams>,
    ) -> Result<SkillOutcome<StateOutput>> {
        self.image_step(
            format!("crop/{state_id}"),
            json!({ "bbox": bbox }),
            with_image,
            None,
        )
        .await
    }

    pub async fn switch_light(
        &self,
        state_id: &str,
        with_image: Option<ImageOutParams>,
    ) -> Result<SkillOutcome<StateOutput>> {
        self.image_step(format!("switch-light/{state_id}"), Value::Null, with_image, None)
            .await
    }

    /// Tune a `switch_light` result. Both values are multipliers around 1.0.
    pub async fn set_light_params(
        &self,
        state_id: &str,
        brightness: f64,
        warmth: f64,
        with_image: Option<ImageOutParams>,
    ) -> Result<SkillOutcome<StateOutput>> {
        self.image_step(
            format!("set-light-params/{state_id}"),
            json!({ "brightness": brightness, "warmth": warmth }),
            with_image,
            None,
        )
        .await
    }

    // ── plumbing ────────────────────────────────────────────────────

    async fn image_step(
        &self,
        path: String,
        params: Value,
        with_image: Option<ImageOutParams>,
        timeout: Option<Duration>,
    ) -> Result<SkillOutcome<StateOutput>> {
        let (state_id, status) = self.ctx.call_skill(&path, params, timeout).await?;
        if status == JobStatus::Ko {
            return self.failed(state_id).await;
        }
        let image = match with_image {
            Some(out) => Some(self.ctx.get_image(&state_id, out).await?),
            None => None,
        };
        Ok(SkillOutcome::Ok(StateOutput { state_id, image }))
    }

    async fn with_meta(
        &self,
        path: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<SkillOutcome<(StateId, Value)>> {
        let (state_id, status) = self.ctx.call_skill(path, params, timeout).await?;
        let meta = self.ctx.get_meta(&state_id).await?;
        Ok(match status {
            JobStatus::Ok => SkillOutcome::Ok((state_id, meta)),
            JobStatus::Ko => SkillOutcome::Failed(ErrorResult::from_meta(state_id, &meta)),
        })
    }

    async fn failed<T>(&self, state_id: StateId) -> Result<SkillOutcome<T>> {
        let meta = self.ctx.get_meta(&state_id).await?;
        Ok(SkillOutcome::Failed(ErrorResult::from_meta(state_id, &meta)))
    }
}

fn outcome_try_map<T, U>(
    outcome: SkillOutcome<T>,
    f: impl FnOnce(T) -> Result<U>,
) -> Result<SkillOutcome<U>> {
    match outcome {
        SkillOutcome::Ok(v) => f(v).map(SkillOutcome::Ok),
        SkillOutcome::Failed(e) => Ok(SkillOutcome::Failed(e)),
    }
}

fn meta_field<T: serde::de::DeserializeOwned>(meta: &Value, key: &str) -> Result<T> {
    let raw = meta
        .get(key)
        .ok_or_else(|| Error::Protocol(format!("state metadata has no `{key}`")))?;
    serde_json::from_value(raw.clone())
        .map_err(|e| Error::Protocol(format!("bad `{key}` in state metadata: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_field_reads_bbox_tuple() {
        let meta = json!({ "status": "ok", "bbox": [10, 20, 110, 220] });
        let bbox: BBox = meta_field(&meta, "bbox").unwrap();
        assert_eq!(bbox, (10, 20, 110, 220));
    }

    #[test]
    fn meta_field_missing_is_protocol_error() {
        let err = meta_field::<String>(&json!({ "status": "ok" }), "product_name").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn detected_objects_keep_extra_fields() {
        let meta = json!({ "results": [{ "bbox": [0, 0, 5, 5], "score": 0.9 }] });
        let results: Vec<DetectedObject> = meta_field(&meta, "results").unwrap();
        assert_eq!(results[0].bbox, (0, 0, 5, 5));
        assert_eq!(results[0].extra["score"], 0.9);
    }

    #[test]
    fn blend_params_skip_defaults() {
        let params = json!(BlendParams::at((1, 2, 3, 4)));
        assert_eq!(params, json!({ "bbox": [1, 2, 3, 4] }));

        let params = json!(BlendParams {
            flip: true,
            seed: Some(7),
            ..BlendParams::at((1, 2, 3, 4))
        });
        assert_eq!(params["flip"], true);
        assert_eq!(params["seed"], 7);
    }

    #[test]
    fn shadow_params_serialize_only_set_fields() {
        let params = ShadowParams {
            background: Some("#ffffff".into()),
            ..ShadowParams::default()
        };
        assert_eq!(json!(params), json!({ "background": "#ffffff" }));
    }

    #[test]
    fn failed_outcome_passes_through_try_map() {
        let failed: SkillOutcome<u8> = SkillOutcome::Failed(ErrorResult {
            state_id: "st_1".into(),
            error: "nope".into(),
        });
        let mapped = outcome_try_map(failed, |_| -> Result<u8> { unreachable!() }).unwrap();
        assert!(!mapped.is_ok());
    }
}
