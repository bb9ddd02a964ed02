use crate::catalog::{derive_filename, group_by_product_number};
use crate::events::{StreamEvent, emit};
use crate::genai::{GenError, GeneratedImage, ImageClient, Reference};
use crate::models::Product;
use crate::store::{ImageStore, StoredImage};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::info;

/// Seam between the orchestrator and the remote model, so runs can be
/// driven by a scripted generator in tests.
pub trait GenerateImage {
    fn generate(
        &self,
        prompt: &str,
        reference: Option<&Reference>,
    ) -> impl Future<Output = Result<GeneratedImage, GenError>> + Send;
}

impl GenerateImage for ImageClient {
    async fn generate(
        &self,
        prompt: &str,
        reference: Option<&Reference>,
    ) -> Result<GeneratedImage, GenError> {
        ImageClient::generate(self, prompt, reference).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    /// Pause between items, respecting the upstream rate limit. Not
    /// applied after the last item.
    pub inter_item_delay: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            inter_item_delay: Duration::from_secs(1),
        }
    }
}

/// Runs the grouped generation pipeline, writing events into `tx`.
///
/// Products are partitioned into variant groups; the first member of a
/// group generates normally and its output becomes the group's reference
/// image, later members are conditioned on it so the geometry survives
/// the color change. A failed first member means later members fall back
/// to unconditioned generation; no per-item failure aborts the run.
///
/// Exactly one progress event is emitted per input product, then one
/// image or error event, then a terminal complete event carrying the
/// stored-image count.
pub async fn run_generation<G: GenerateImage>(
    client: &G,
    store: &ImageStore,
    products: &[Product],
    tx: &mpsc::Sender<StreamEvent>,
    opts: &GenerateOptions,
) {
    let session = store.begin_session().await;
    let total = products.len();
    let groups = group_by_product_number(products);
    info!(
        target = "flatlay.generate",
        total,
        groups = groups.len(),
        %session,
        "generation run started"
    );

    let mut counter = 0usize;
    for group in &groups {
        let mut reference: Option<Reference> = None;

        for (member_idx, product) in group.iter().enumerate() {
            counter += 1;
            let filename = derive_filename(
                &product.product_number,
                &product.gender_code,
                &product.color_code,
            );

            if !emit(
                tx,
                StreamEvent::item_progress(counter, total, &product.product_name, &filename),
            )
            .await
            {
                return;
            }

            let is_variant = member_idx > 0 && reference.is_some();
            let outcome = if is_variant {
                let prompt = format!(
                    "{}. Generate the exact same product design but in {} color.",
                    product.prompt, product.color_name
                );
                client.generate(&prompt, reference.as_ref()).await
            } else {
                client.generate(&product.prompt, None).await
            };

            match outcome {
                Ok(image) => {
                    if member_idx == 0 {
                        reference = Some(Reference {
                            data: image.data.clone(),
                            mime_type: image.mime_type.clone(),
                        });
                    }

                    let encoded = BASE64.encode(&image.data);
                    store
                        .insert(
                            session,
                            StoredImage {
                                filename: filename.clone(),
                                data: image.data,
                                mime_type: image.mime_type,
                                product_name: product.product_name.clone(),
                                color_name: product.color_name.clone(),
                                generated_at: Utc::now(),
                            },
                        )
                        .await;

                    let sent = emit(
                        tx,
                        StreamEvent::Image {
                            filename: filename.clone(),
                            product_name: product.product_name.clone(),
                            color_name: product.color_name.clone(),
                            product_number: product.product_number.clone(),
                            gender_code: product.gender_code.clone(),
                            color_code: product.color_code.clone(),
                            prompt: product.prompt.clone(),
                            data: encoded,
                        },
                    )
                    .await;
                    if !sent {
                        return;
                    }
                }
                Err(err) => {
                    let sent = emit(
                        tx,
                        StreamEvent::error(format!(
                            "Failed to generate image for {filename}: {}",
                            err.message
                        )),
                    )
                    .await;
                    if !sent {
                        return;
                    }
                }
            }

            if counter < total && !opts.inter_item_delay.is_zero() {
                sleep(opts.inter_item_delay).await;
            }
        }
    }

    let stored = store.len().await;
    info!(
        target = "flatlay.generate",
        stored, "generation run finished"
    );
    let _ = emit(tx, StreamEvent::generation_complete(stored)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum Script {
        Image(Vec<u8>),
        Fail(&'static str),
    }

    /// Replays a fixed result sequence and records whether each call
    /// carried a reference image (and which bytes).
    struct ScriptedGenerator {
        script: Mutex<VecDeque<Script>>,
        calls: Mutex<Vec<Option<Vec<u8>>>>,
    }

    impl ScriptedGenerator {
        fn new(script: Vec<Script>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn references(&self) -> Vec<Option<Vec<u8>>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl GenerateImage for ScriptedGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            reference: Option<&Reference>,
        ) -> Result<GeneratedImage, GenError> {
            self.calls
                .lock()
                .unwrap()
                .push(reference.map(|r| r.data.clone()));
            match self.script.lock().unwrap().pop_front() {
                Some(Script::Image(data)) => Ok(GeneratedImage {
                    data,
                    mime_type: "image/jpeg".to_string(),
                }),
                Some(Script::Fail(message)) => Err(GenError {
                    message: message.to_string(),
                }),
                None => panic!("generator called more times than scripted"),
            }
        }
    }

    fn product(number: &str, color_code: &str, color_name: &str) -> Product {
        Product {
            product_number: number.to_string(),
            gender_code: "M".to_string(),
            color_code: color_code.to_string(),
            product_name: "Trail Jacket".to_string(),
            color_name: color_name.to_string(),
            prompt: "flat-lay photo of a jacket".to_string(),
        }
    }

    fn no_delay() -> GenerateOptions {
        GenerateOptions {
            inter_item_delay: Duration::ZERO,
        }
    }

    async fn collect(
        generator: &ScriptedGenerator,
        store: &ImageStore,
        products: &[Product],
    ) -> Vec<StreamEvent> {
        let (tx, mut rx) = mpsc::channel(64);
        run_generation(generator, store, products, &tx, &no_delay()).await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn count(events: &[StreamEvent], name: &str) -> usize {
        events
            .iter()
            .filter(|event| serde_json::to_value(event).unwrap()["type"] == name)
            .count()
    }

    #[tokio::test]
    async fn two_variant_group_uses_one_reference_call() {
        let generator = ScriptedGenerator::new(vec![
            Script::Image(vec![0xAA]),
            Script::Image(vec![0xBB]),
        ]);
        let store = ImageStore::new();
        let products = vec![
            product("CNC-P001", "BLK", "Black"),
            product("CNC-P001", "NVY", "Navy"),
        ];

        let events = collect(&generator, &store, &products).await;

        assert_eq!(count(&events, "progress"), 2);
        assert_eq!(count(&events, "image"), 2);
        let refs = generator.references();
        assert_eq!(refs[0], None);
        assert_eq!(refs[1], Some(vec![0xAA]), "variant must see member 0's bytes");

        let complete = serde_json::to_value(events.last().unwrap()).unwrap();
        assert_eq!(complete["type"], "complete");
        assert_eq!(complete["total"], 2);
    }

    #[tokio::test]
    async fn failed_first_member_falls_back_to_unreferenced_generation() {
        let generator = ScriptedGenerator::new(vec![
            Script::Fail("model unavailable"),
            Script::Image(vec![0x01]),
            Script::Image(vec![0x02]),
        ]);
        let store = ImageStore::new();
        let products = vec![
            product("CNC-P001", "BLK", "Black"),
            product("CNC-P001", "NVY", "Navy"),
            product("CNC-P001", "WHT", "White"),
        ];

        let events = collect(&generator, &store, &products).await;

        assert_eq!(count(&events, "progress"), 3);
        assert_eq!(count(&events, "error"), 1);
        assert_eq!(count(&events, "image"), 2);
        assert!(
            generator.references().iter().all(Option::is_none),
            "no call may carry a reference when member 0 failed"
        );
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn every_item_failing_still_reaches_complete() {
        let generator = ScriptedGenerator::new(vec![
            Script::Fail("boom"),
            Script::Fail("boom"),
        ]);
        let store = ImageStore::new();
        let products = vec![
            product("CNC-P001", "BLK", "Black"),
            product("CNC-P002", "NVY", "Navy"),
        ];

        let events = collect(&generator, &store, &products).await;

        assert_eq!(count(&events, "progress"), 2);
        assert_eq!(count(&events, "error"), 2);
        let complete = serde_json::to_value(events.last().unwrap()).unwrap();
        assert_eq!(complete["total"], 0);
    }

    #[tokio::test]
    async fn error_events_name_the_derived_filename() {
        let generator = ScriptedGenerator::new(vec![Script::Fail("quota exceeded")]);
        let store = ImageStore::new();
        let products = vec![product("CNC-P009", "GRN", "Green")];

        let events = collect(&generator, &store, &products).await;
        let error = events
            .iter()
            .map(|event| serde_json::to_value(event).unwrap())
            .find(|value| value["type"] == "error")
            .unwrap();
        let message = error["message"].as_str().unwrap();
        assert!(message.contains("CNCP009MGRN"));
        assert!(message.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn separate_groups_do_not_share_references() {
        let generator = ScriptedGenerator::new(vec![
            Script::Image(vec![0x0A]),
            Script::Image(vec![0x0B]),
        ]);
        let store = ImageStore::new();
        let products = vec![
            product("CNC-P001", "BLK", "Black"),
            product("CNC-P002", "BLK", "Black"),
        ];

        collect(&generator, &store, &products).await;
        assert!(generator.references().iter().all(Option::is_none));
    }
}
