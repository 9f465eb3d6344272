//! # Mesh Generator
//!
//! End-to-end driver from a grain-boundary surface mesh to a measured
//! tetrahedral volume mesh.
//!
//! ## Stages
//!
//! ```text
//! validate config → rebuild adjacency → collapse / smooth / relax
//!     → compact → jitter → grain registry → interior sampling (+ voxels)
//!     → tetrahedralize and repair → measure → improve → measure
//! ```
//!
//! Fatal errors abort the run. Budget exhaustion, flat grains, degenerate
//! elements and unresolved element grains are collected as diagnostics on
//! the output.

use crate::config::MeshGenConfig;
use crate::diagnostic::Diagnostic;
use crate::error::{MeshGenError, MeshGenResult};
use crate::grain::GrainRegistry;
use crate::ids::GrainId;
use crate::io;
use crate::quality::{improve, measure, ImproveReport, QualityReport};
use crate::sampler::{GrainSamples, InteriorSampler, VoxelGrid};
use crate::surface::cleanup::{
    collapse_small_or_misoriented_triangles, relax_sharp_angle_triangles, smooth_nodes, CollapseReport,
    RelaxReport,
};
use crate::surface::{Renumbering, SurfaceMesh};
use crate::volume::{BowyerWatson, BuildReport, Tetrahedralizer, VolumeMesh, VolumeMeshBuilder};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Counters of every stage of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Small/misoriented triangle pass, if it ran.
    pub collapse: Option<CollapseReport>,
    /// Nodes moved by Laplacian smoothing.
    pub smoothed_nodes: usize,
    /// Sharp-angle relaxation, if it ran.
    pub relax: Option<RelaxReport>,
    /// Surface nodes perturbed before tetrahedralization.
    pub jittered_nodes: usize,
    /// Random draws spent per sampled grain.
    pub sampling_attempts: BTreeMap<GrainId, usize>,
    /// Tetrahedralization and repair cycles.
    pub build: BuildReport,
    /// Edge-collapse improvement, if it ran.
    pub improve: Option<ImproveReport>,
    /// Volume enclosed by the grain boundaries.
    pub surface_volume: f64,
    /// Volume of the measured elements.
    pub volume_mesh_volume: f64,
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct MeshGenOutput {
    /// The cleaned, compacted and jittered surface mesh.
    pub surface: SurfaceMesh,
    /// Mapping from input ids to compacted surface ids.
    pub renumbering: Renumbering,
    /// Grain aggregates of the final surface.
    pub grains: GrainRegistry,
    /// Voxel grid painted with grain ids, when one was requested.
    pub voxels: Option<VoxelGrid>,
    /// The tetrahedral mesh.
    pub volume: VolumeMesh,
    /// Statistics of the final volume mesh.
    pub quality: QualityReport,
    /// Stage counters.
    pub report: RunReport,
    /// Non-fatal findings.
    pub diagnostics: Vec<Diagnostic>,
}

/// Solid mesh generator over an injectable tetrahedralizer.
///
/// ## Example
///
/// ```rust,ignore
/// use solid_mesh::{MeshGenConfig, MeshGenerator};
///
/// let generator = MeshGenerator::new(MeshGenConfig::default());
/// let output = generator.run_files("nodes.txt", "triangles.txt")?;
/// println!("{} elements", output.volume.live_element_count());
/// ```
#[derive(Debug, Clone)]
pub struct MeshGenerator<T: Tetrahedralizer = BowyerWatson> {
    config: MeshGenConfig,
    tetrahedralizer: T,
}

impl MeshGenerator {
    /// Creates a generator using the in-process Delaunay tetrahedralizer.
    pub fn new(config: MeshGenConfig) -> Self {
        Self::with_tetrahedralizer(config, BowyerWatson::default())
    }
}

impl<T: Tetrahedralizer> MeshGenerator<T> {
    /// Creates a generator using `tetrahedralizer`.
    pub fn with_tetrahedralizer(config: MeshGenConfig, tetrahedralizer: T) -> Self {
        Self {
            config,
            tetrahedralizer,
        }
    }

    /// The run configuration.
    pub fn config(&self) -> &MeshGenConfig {
        &self.config
    }

    /// Reads a node file and a triangle file, then [`run`](Self::run)s.
    ///
    /// # Errors
    ///
    /// Anything [`io::read_surface`] or [`run`](Self::run) returns.
    pub fn run_files(&self, nodes: impl AsRef<Path>, triangles: impl AsRef<Path>) -> MeshGenResult<MeshGenOutput> {
        let surface = io::read_surface(
            BufReader::new(File::open(nodes)?),
            BufReader::new(File::open(triangles)?),
            self.config.tolerance,
        )?;
        self.run(surface)
    }

    /// Meshes `surface` end to end.
    ///
    /// # Errors
    ///
    /// [`MeshGenError::Config`] for an invalid configuration,
    /// [`MeshGenError::ExternalToolFailure`] when tetrahedralization fails,
    /// [`MeshGenError::InvalidMesh`] when the surface has no grain to mesh.
    pub fn run(&self, mut surface: SurfaceMesh) -> MeshGenResult<MeshGenOutput> {
        let config = &self.config;
        config.validate()?;
        let mut report = RunReport::default();
        let mut diagnostics = Vec::new();

        surface.rebuild_adjacency();
        let degenerate = surface.live_triangles().filter(|(_, t)| t.degenerate).count();
        if degenerate > 0 {
            diagnostics.push(Diagnostic::warning(
                "surface",
                format!("{degenerate} zero-area triangles in the input"),
            ));
        }

        self.clean_surface(&mut surface, &mut report, &mut diagnostics)?;
        let renumbering = surface.compact();

        let mut rng = StdRng::seed_from_u64(config.seed);
        if config.node_jitter > 0.0 {
            report.jittered_nodes = surface.jitter(&mut rng, config.node_jitter);
        }

        let grains = GrainRegistry::compute(&surface)?;
        if grains.is_empty() {
            return Err(MeshGenError::invalid_mesh("surface bounds no grain"));
        }
        for grain in grains.iter().filter(|g| g.volume < 0.0) {
            diagnostics.push(
                Diagnostic::warning("grains", format!("grain {} has negative volume {:.6}", grain.id, grain.volume))
                    .with_hint("check the triangle winding of this grain"),
            );
        }
        report.surface_volume = grains.total_volume();

        let mut voxels = config.voxel_grid.map(VoxelGrid::new);
        let samples = self.sample(&surface, &grains, voxels.as_mut(), &mut rng, &mut report, &mut diagnostics)?;

        let (mut volume, build) =
            VolumeMeshBuilder::new(&self.tetrahedralizer, config).build(&surface, &grains, &samples)?;
        if build.unresolved_elements > 0 {
            diagnostics.push(Diagnostic::info(
                "volume",
                format!(
                    "{} elements with unresolved grain, volume {:.6}",
                    build.unresolved_elements, build.unresolved_volume
                ),
            ));
        }
        report.build = build;

        let mut quality = measure(&mut volume, config.tolerance);
        if config.improve_mesh {
            let improved = improve(&mut volume, config);
            if !improved.converged {
                diagnostics.push(
                    Diagnostic::from_error("improve", &MeshGenError::timeout("improve", config.max_improve_passes))
                        .with_hint("raise max_improve_passes or widen the dihedral range"),
                );
            }
            if improved.collapses > 0 {
                quality = measure(&mut volume, config.tolerance);
            }
            report.improve = Some(improved);
        }
        if quality.degenerate_elements > 0 {
            diagnostics.push(Diagnostic::warning(
                "quality",
                format!("{} degenerate elements left out of the statistics", quality.degenerate_elements),
            ));
        }
        report.volume_mesh_volume = quality.total_volume;

        log::info!(
            "meshing done: surface volume {:.6}, volume mesh {:.6}, {} diagnostics",
            report.surface_volume,
            report.volume_mesh_volume,
            diagnostics.len()
        );
        Ok(MeshGenOutput {
            surface,
            renumbering,
            grains,
            voxels,
            volume,
            quality,
            report,
            diagnostics,
        })
    }

    fn clean_surface(
        &self,
        surface: &mut SurfaceMesh,
        report: &mut RunReport,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> MeshGenResult<()> {
        let config = &self.config;
        if config.collapse_triangles {
            report.collapse = Some(collapse_small_or_misoriented_triangles(surface, config)?);
        }
        if config.smooth_nodes {
            report.smoothed_nodes = smooth_nodes(surface)?;
        }
        if config.relax_triangles {
            let relax = relax_sharp_angle_triangles(surface, config)?;
            if !relax.converged {
                diagnostics.push(
                    Diagnostic::from_error("relax", &MeshGenError::timeout("relax", config.max_relax_passes))
                        .with_hint("raise max_relax_passes"),
                );
            }
            report.relax = Some(relax);
        }
        Ok(())
    }

    fn sample(
        &self,
        surface: &SurfaceMesh,
        grains: &GrainRegistry,
        mut voxels: Option<&mut VoxelGrid>,
        rng: &mut StdRng,
        report: &mut RunReport,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> MeshGenResult<Vec<GrainSamples>> {
        let mut sampler = InteriorSampler::new(&self.config);
        let mut samples = Vec::new();
        for grain in grains.iter() {
            match sampler.sample_grain(surface, grain, voxels.as_deref_mut(), rng) {
                Ok(grain_samples) => {
                    report.sampling_attempts.insert(grain.id, grain_samples.attempts);
                    if !grain_samples.converged {
                        diagnostics.push(
                            Diagnostic::from_error(
                                "sampler",
                                &MeshGenError::timeout(format!("sampling grain {}", grain.id), self.config.max_sampling_attempts),
                            )
                            .with_hint(format!(
                                "grain {} holds {} of {} nodes",
                                grain.id,
                                grain.node_count + grain_samples.points.len(),
                                self.config.target_grain_nodes
                            )),
                        );
                    }
                    samples.push(grain_samples);
                }
                Err(err) if !err.is_fatal() => {
                    log::warn!("grain {} skipped: {err}", grain.id);
                    diagnostics.push(Diagnostic::from_error("sampler", &err));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(samples)
    }
}
