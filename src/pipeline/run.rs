//! Per-scene pipeline controller.
//!
//! Walks the scene mesh by mesh, sequencing classify -> ensure_uv -> bake ->
//! rewire per (mesh, material) pair and aggregating a result report. Every
//! failure is recorded at its own scope and iteration continues; nothing
//! recorded here ever aborts a sibling pair, the mesh, or the scene.

use log::{info, warn};

use crate::document::{MaterialId, Scene};
use crate::engine::{BakeEngine, BakeSettings};
use crate::error::{BakeError, StageError};
use crate::texture_store::{BakeKey, TextureStore};
use crate::unwrap::{Unwrapper, ensure_uv};

use super::{bake_material, classify, rewire};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineOptions {
    pub bake: BakeSettings,
    /// Worker threads for one mesh's independent bake jobs. 1 keeps the
    /// whole run sequential.
    pub jobs: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            bake: BakeSettings::default(),
            jobs: 1,
        }
    }
}

/// Observable controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Classifying,
    Processing(usize),
    Done,
}

/// One recorded per-material failure: which pair, and at which stage.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialFailure {
    pub mesh: String,
    pub material: String,
    pub error: StageError,
}

/// Per-scene aggregate report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineResult {
    pub meshes_processed: usize,
    pub materials_baked: usize,
    pub failures: Vec<MaterialFailure>,
}

impl PipelineResult {
    /// At least one material was baked and rewired. A scene with nothing to
    /// bake reports false here without being an error.
    pub fn baked_any(&self) -> bool {
        self.materials_baked > 0
    }
}

pub struct Pipeline<'a> {
    engine: &'a dyn BakeEngine,
    unwrapper: &'a dyn Unwrapper,
    store: TextureStore,
    options: PipelineOptions,
    state: PipelineState,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        engine: &'a dyn BakeEngine,
        unwrapper: &'a dyn Unwrapper,
        store: TextureStore,
        options: PipelineOptions,
    ) -> Self {
        Self {
            engine,
            unwrapper,
            store,
            options,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run the bake-and-rewire pipeline over every (mesh, material) pair of
    /// the scene, in scene order. The same material referenced by two meshes
    /// is processed once per mesh, against that mesh's UV layout.
    pub fn run(&mut self, scene: &mut Scene) -> PipelineResult {
        let mut result = PipelineResult::default();
        self.state = PipelineState::Classifying;

        for mesh_index in 0..scene.meshes.len() {
            self.state = PipelineState::Processing(mesh_index);
            result.meshes_processed += 1;
            self.process_mesh(scene, mesh_index, &mut result);
        }

        self.state = PipelineState::Done;
        info!(
            "pipeline done: {} meshes, {} baked, {} failures",
            result.meshes_processed,
            result.materials_baked,
            result.failures.len()
        );
        result
    }

    fn process_mesh(&self, scene: &mut Scene, mesh_index: usize, result: &mut PipelineResult) {
        let emissive: Vec<MaterialId> = scene.meshes[mesh_index]
            .distinct_materials()
            .into_iter()
            .filter(|&m| classify(&scene.materials[m]))
            .collect();
        if emissive.is_empty() {
            return;
        }

        let mesh_name = scene.meshes[mesh_index].name.clone();
        match ensure_uv(&mut scene.meshes[mesh_index], self.unwrapper) {
            Ok(true) => info!("generated uv layer for mesh '{mesh_name}'"),
            Ok(false) => {}
            Err(e) => {
                // Unwrap failure is mesh-level: every emissive material of
                // this mesh is skipped with the same reason.
                warn!("unwrap failed for mesh '{mesh_name}': {e}");
                for &m in &emissive {
                    result.failures.push(MaterialFailure {
                        mesh: mesh_name.clone(),
                        material: scene.materials[m].name.clone(),
                        error: StageError::Unwrap(e.clone()),
                    });
                }
                return;
            }
        }

        let baked = if self.options.jobs > 1 && emissive.len() > 1 {
            self.bake_mesh_parallel(scene, mesh_index, &emissive)
        } else {
            emissive
                .iter()
                .map(|&m| (m, self.bake_one(scene, mesh_index, m)))
                .collect()
        };

        // Rewires are serialized on this thread, in slot order, regardless
        // of how the bakes ran.
        for (m, bake_result) in baked {
            let material_name = scene.materials[m].name.clone();
            let error = match bake_result {
                Err(e) => StageError::Bake(e),
                Ok(_) => {
                    let key = BakeKey {
                        mesh: mesh_index,
                        material: m,
                    };
                    let Some(texture) = self.store.take(key) else {
                        // take() only fails if a sibling consumed the key,
                        // which the per-pair ownership rule forbids.
                        continue;
                    };
                    match rewire(&mut scene.materials[m], &texture) {
                        Ok(()) => {
                            scene.images.insert(texture.name.clone(), texture.pixels);
                            result.materials_baked += 1;
                            continue;
                        }
                        Err(e) => StageError::Rewire(e),
                    }
                }
            };
            warn!("material '{material_name}' on mesh '{mesh_name}' failed: {error}");
            result.failures.push(MaterialFailure {
                mesh: mesh_name.clone(),
                material: material_name,
                error,
            });
        }
    }

    fn bake_one(
        &self,
        scene: &Scene,
        mesh_index: usize,
        material: MaterialId,
    ) -> Result<String, BakeError> {
        bake_material(
            self.engine,
            &self.store,
            BakeKey {
                mesh: mesh_index,
                material,
            },
            &scene.meshes[mesh_index],
            &scene.materials[material],
            &scene.images,
            &self.options.bake,
        )
    }

    /// Fan one mesh's independent bake jobs out over scoped worker threads.
    /// Results come back in slot order, so the observable outcome matches
    /// the sequential path.
    fn bake_mesh_parallel(
        &self,
        scene: &Scene,
        mesh_index: usize,
        emissive: &[MaterialId],
    ) -> Vec<(MaterialId, Result<String, BakeError>)> {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<MaterialId>();
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        for &m in emissive {
            let _ = job_tx.send(m);
        }
        drop(job_tx);

        // The unwrapper seam is not Sync, so workers capture only the pieces
        // the bake needs: the engine, a store handle, and the settings.
        let engine = self.engine;
        let settings = self.options.bake;
        let mesh = &scene.meshes[mesh_index];
        std::thread::scope(|s| {
            for _ in 0..self.options.jobs.min(emissive.len()) {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                let store = self.store.clone();
                s.spawn(move || {
                    for m in job_rx.iter() {
                        let outcome = bake_material(
                            engine,
                            &store,
                            BakeKey {
                                mesh: mesh_index,
                                material: m,
                            },
                            mesh,
                            &scene.materials[m],
                            &scene.images,
                            &settings,
                        );
                        let _ = done_tx.send((m, outcome));
                    }
                });
            }
        });
        drop(done_tx);

        let mut results: Vec<(MaterialId, Result<String, BakeError>)> = done_rx.iter().collect();
        results.sort_by_key(|(m, _)| emissive.iter().position(|x| x == m));
        results
    }
}
