#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::decode::{OutputStyle, RawOutput, RowLayout};

use super::OnnxLayout;

/// Tract-based backend for ONNX YOLO models.
///
/// The model is compiled for a fixed input shape; frames are resized to it
/// regardless of the size a preset asks for.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
    layout: OnnxLayout,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        width: u32,
        height: u32,
        layout: OnnxLayout,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({}x{}, {:?})",
            model_path.display(),
            width,
            height,
            layout
        );

        Ok(Self {
            model,
            width,
            height,
            layout,
        })
    }

    fn build_input(&self, frame: &RgbImage) -> Tensor {
        let resized = image::imageops::resize(frame, self.width, self.height, FilterType::Triangle);
        let width = self.width as usize;
        let pixels = resized.as_raw();
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );
        input.into_tensor()
    }

    fn yolov8_rows(&self, outputs: &TVec<TValue>) -> Result<Vec<Vec<f32>>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let shape = output.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
            return Err(anyhow!("unexpected yolov8 output shape {:?}", shape));
        }
        let (channels, count) = (shape[1], shape[2]);
        let data = output
            .as_slice::<f32>()
            .context("model output tensor was not f32")?;
        let in_w = self.width as f32;
        let in_h = self.height as f32;

        let rows = (0..count)
            .map(|i| {
                let at = |ch: usize| data[ch * count + i];
                let mut row = Vec::with_capacity(channels);
                row.push(at(0) / in_w);
                row.push(at(1) / in_h);
                row.push(at(2) / in_w);
                row.push(at(3) / in_h);
                row.extend((4..channels).map(at));
                row
            })
            .collect();
        Ok(rows)
    }

    fn yolov3_layers(outputs: &TVec<TValue>) -> Result<Vec<Vec<Vec<f32>>>> {
        outputs
            .iter()
            .map(|output| {
                let cols = *output
                    .shape()
                    .last()
                    .ok_or_else(|| anyhow!("scalar model output"))?;
                if cols < 6 {
                    return Err(anyhow!("unexpected yolov3 output shape {:?}", output.shape()));
                }
                let data = output
                    .as_slice::<f32>()
                    .context("model output tensor was not f32")?;
                Ok(data.chunks_exact(cols).map(<[f32]>::to_vec).collect())
            })
            .collect()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn output_style(&self) -> OutputStyle {
        match self.layout {
            OnnxLayout::Yolov8 => OutputStyle::Rows(RowLayout::ScoresOnly),
            OnnxLayout::Yolov3 => OutputStyle::Rows(RowLayout::ObjectnessIgnored),
        }
    }

    fn infer(&self, frame: &RgbImage, input_size: (u32, u32)) -> Result<RawOutput> {
        if input_size != (self.width, self.height) {
            log::debug!(
                "TractBackend: requested input {:?}, model compiled for {}x{}",
                input_size,
                self.width,
                self.height
            );
        }
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        match self.layout {
            OnnxLayout::Yolov8 => Ok(RawOutput::Rows(vec![self.yolov8_rows(&outputs)?])),
            OnnxLayout::Yolov3 => Ok(RawOutput::Rows(Self::yolov3_layers(&outputs)?)),
        }
    }

    fn warm_up(&self) -> Result<()> {
        let blank = RgbImage::new(self.width, self.height);
        self.infer(&blank, (self.width, self.height)).map(|_| ())
    }
}
