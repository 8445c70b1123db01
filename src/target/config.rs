//! AMDGPU backend configuration
//!
//! Settings that drive device code generation: the gfx version being
//! targeted, the optimization level, and where the ROCm device libraries
//! live. Values come from defaults, environment variables, or the builder
//! methods below.
//!
//! ```rust,ignore
//! use rocmlower::target::config::BackendConfig;
//!
//! let config = BackendConfig::from_env().with_amdgpu_version(906);
//! config.validate()?;
//! assert_eq!(config.target_cpu(), "gfx906");
//! ```

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{LowerError, LowerResult};
use crate::ir::DeviceModule;
use crate::target::arch::{gfx_name, GpuArchitecture};

pub const DEFAULT_AMDGPU_VERSION: u32 = 900;
pub const DEFAULT_OPT_LEVEL: u32 = 3;
pub const DEFAULT_ROCDL_DIR: &str = "/opt/rocm/lib";
pub const DEFAULT_TARGET_TRIPLE: &str = "amdgcn--amdhsa-amdgiz";
pub const DEFAULT_INLINE_THRESHOLD: u32 = 1_048_576;

/// Code object v2 only; v3 stays disabled.
pub const TARGET_FEATURES: &str = "-code-object-v3";

/// Lowest optimization level the backend generates code for.
pub const MIN_SUPPORTED_OPT_LEVEL: u32 = 2;

/// Version-neutral ROCm device library bitcodes, in link order.
const ROCDL_VERSION_NEUTRAL_BITCODES: [&str; 8] = [
    "hc.amdgcn.bc",
    "opencl.amdgcn.bc",
    "ocml.amdgcn.bc",
    "ockl.amdgcn.bc",
    "oclc_finite_only_off.amdgcn.bc",
    "oclc_daz_opt_off.amdgcn.bc",
    "oclc_correctly_rounded_sqrt_on.amdgcn.bc",
    "oclc_unsafe_math_off.amdgcn.bc",
];

/// Machine code generation effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodegenOptLevel {
    None,
    Less,
    Default,
    Aggressive,
}

/// Which calls the inliner may inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlinerPolicy {
    /// Only functions marked `alwaysinline`.
    AlwaysInlineOnly,
    /// Cost-based inlining up to the given threshold.
    Threshold(u32),
}

/// Floating-point contraction allowed when selecting instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpOpFusion {
    Strict,
    Standard,
    /// Fuse into FMA whenever profitable.
    Fast,
}

/// IR optimization pipeline settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassPipeline {
    pub opt_level: u32,
    pub size_level: u32,
    pub inliner: InlinerPolicy,
    pub disable_unroll_loops: bool,
    pub loop_vectorize: bool,
    pub slp_vectorize: bool,
    /// Run SROA again after the standard passes; unrolling exposes more
    /// scalar replacement opportunities.
    pub extra_sroa: bool,
}

/// Everything needed to create the target machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetMachineOptions {
    pub triple: String,
    pub cpu: String,
    pub features: String,
    pub opt_level: CodegenOptLevel,
    pub fp_op_fusion: FpOpFusion,
    pub asm_verbose: bool,
}

/// AMDGPU backend configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Numeric gfx version, e.g. 900 for gfx900
    pub amdgpu_version: u32,
    /// Backend optimization level (0-3)
    pub opt_level: u32,
    /// Directory holding the ROCm device library bitcodes
    pub rocdl_dir: PathBuf,
    /// Triple used when a module carries none
    pub target_triple: String,
    /// Inliner threshold at optimization levels above 1
    pub inline_threshold: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            amdgpu_version: DEFAULT_AMDGPU_VERSION,
            opt_level: DEFAULT_OPT_LEVEL,
            rocdl_dir: PathBuf::from(DEFAULT_ROCDL_DIR),
            target_triple: DEFAULT_TARGET_TRIPLE.to_string(),
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
        }
    }
}

impl BackendConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `ROCMLOWER_AMDGPU_VERSION`: gfx version number (e.g. 906)
    /// - `ROCMLOWER_OPT_LEVEL`: backend optimization level
    /// - `ROCMLOWER_ROCDL_DIR`: ROCm device library directory
    /// - `ROCMLOWER_TARGET_TRIPLE`: fallback target triple
    ///
    /// Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = BackendConfig::default();

        if let Ok(version) = env::var("ROCMLOWER_AMDGPU_VERSION") {
            let version = version.trim().trim_start_matches("gfx");
            if let Ok(version) = version.parse::<u32>() {
                config.amdgpu_version = version;
            }
        }

        if let Ok(level) = env::var("ROCMLOWER_OPT_LEVEL") {
            if let Ok(level) = level.trim().parse::<u32>() {
                config.opt_level = level;
            }
        }

        if let Ok(dir) = env::var("ROCMLOWER_ROCDL_DIR") {
            if !dir.is_empty() {
                config.rocdl_dir = PathBuf::from(dir);
            }
        }

        if let Ok(triple) = env::var("ROCMLOWER_TARGET_TRIPLE") {
            if !triple.trim().is_empty() {
                config.target_triple = triple.trim().to_string();
            }
        }

        config
    }

    pub fn with_amdgpu_version(mut self, version: u32) -> Self {
        self.amdgpu_version = version;
        self
    }

    pub fn with_opt_level(mut self, opt_level: u32) -> Self {
        self.opt_level = opt_level;
        self
    }

    pub fn with_rocdl_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.rocdl_dir = dir.into();
        self
    }

    pub fn with_target_triple(mut self, triple: impl Into<String>) -> Self {
        self.target_triple = triple.into();
        self
    }

    pub fn with_override(&self, f: impl FnOnce(&mut BackendConfig)) -> Self {
        let mut config = self.clone();
        f(&mut config);
        config
    }

    /// Validate the configuration
    ///
    /// Unoptimized code generation is not supported: levels below 2 are
    /// rejected here rather than at code generation time.
    pub fn validate(&self) -> LowerResult<()> {
        if self.opt_level > 3 {
            return Err(LowerError::InvalidConfiguration(format!(
                "opt_level must be between 0 and 3, got {}",
                self.opt_level
            )));
        }
        if self.opt_level < MIN_SUPPORTED_OPT_LEVEL {
            return Err(LowerError::InvalidConfiguration(format!(
                "unoptimized code generation is not supported (opt_level {} < {})",
                self.opt_level, MIN_SUPPORTED_OPT_LEVEL
            )));
        }
        if self.amdgpu_version == 0 {
            return Err(LowerError::InvalidConfiguration(
                "amdgpu_version cannot be zero".to_string(),
            ));
        }
        if !self.target_triple.starts_with("amdgcn") {
            return Err(LowerError::InvalidConfiguration(format!(
                "target triple {} is not an amdgcn triple",
                self.target_triple
            )));
        }
        if self.inline_threshold == 0 {
            return Err(LowerError::InvalidConfiguration(
                "inline_threshold cannot be zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn architecture(&self) -> GpuArchitecture {
        GpuArchitecture::from_version(self.amdgpu_version)
    }

    /// Processor name handed to code generation, e.g. `gfx900`.
    pub fn target_cpu(&self) -> String {
        gfx_name(self.amdgpu_version)
    }

    pub fn target_features(&self) -> &'static str {
        TARGET_FEATURES
    }

    pub fn codegen_opt_level(&self) -> CodegenOptLevel {
        match self.opt_level {
            1 => CodegenOptLevel::Less,
            2 => CodegenOptLevel::Default,
            3 => CodegenOptLevel::Aggressive,
            _ => CodegenOptLevel::None,
        }
    }

    /// Optimization pipeline for the configured level (size level 0).
    pub fn pass_pipeline(&self) -> PassPipeline {
        self.pass_pipeline_with_size_level(0)
    }

    pub fn pass_pipeline_with_size_level(&self, size_level: u32) -> PassPipeline {
        let opt_level = self.opt_level;
        PassPipeline {
            opt_level,
            size_level,
            inliner: if opt_level > 1 {
                InlinerPolicy::Threshold(self.inline_threshold)
            } else {
                InlinerPolicy::AlwaysInlineOnly
            },
            disable_unroll_loops: opt_level == 0,
            loop_vectorize: opt_level > 0,
            slp_vectorize: opt_level > 1 && size_level < 2,
            extra_sroa: opt_level > 0,
        }
    }

    /// Triple for `module`: its own when it names an amdgcn target,
    /// otherwise the configured fallback.
    pub fn resolve_target_triple(&self, module: &DeviceModule) -> String {
        match module.target_triple() {
            Some(triple) if triple.starts_with("amdgcn") => triple.to_string(),
            other => {
                tracing::warn!(
                    module = module.name(),
                    found = ?other,
                    fallback = %self.target_triple,
                    "target triple not found in the module"
                );
                self.target_triple.clone()
            }
        }
    }

    pub fn target_machine_options(&self, module: &DeviceModule) -> TargetMachineOptions {
        TargetMachineOptions {
            triple: self.resolve_target_triple(module),
            cpu: self.target_cpu(),
            features: TARGET_FEATURES.to_string(),
            opt_level: self.codegen_opt_level(),
            fp_op_fusion: FpOpFusion::Fast,
            asm_verbose: false,
        }
    }

    /// Device library bitcode files to link, in link order.
    pub fn rocdl_bitcode_paths(&self) -> Vec<PathBuf> {
        ROCDL_VERSION_NEUTRAL_BITCODES
            .iter()
            .map(|name| name.to_string())
            .chain(std::iter::once(format!(
                "oclc_isa_version_{}.amdgcn.bc",
                self.amdgpu_version
            )))
            .map(|name| self.rocdl_dir.join(name))
            .collect()
    }

    /// Paths from [`rocdl_bitcode_paths`](Self::rocdl_bitcode_paths) that do
    /// not exist on disk.
    pub fn missing_rocdl_bitcodes(&self) -> Vec<PathBuf> {
        self.rocdl_bitcode_paths()
            .into_iter()
            .filter(|path| !path.exists())
            .collect()
    }

    /// Whether `module` calls anything the device libraries could provide.
    ///
    /// Any declaration that is not a compiler intrinsic counts, which may
    /// link the libraries when they are not strictly needed.
    pub fn needs_rocdl(&self, module: &DeviceModule) -> bool {
        let needed = module.functions().iter().any(|decl| !decl.is_intrinsic());
        tracing::debug!(module = module.name(), needed, "device library link check");
        needed
    }
}

/// Name for a temporary compilation product: the basename of `input` with
/// its extension replaced by `extension`.
pub fn temp_product_name(input: impl AsRef<Path>, extension: &str) -> String {
    let input = input.as_ref();
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        stem
    } else {
        format!("{}.{}", stem, extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionType, IrType};
    use serial_test::serial;

    #[test]
    fn test_defaults_validate() {
        let config = BackendConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target_cpu(), "gfx900");
        assert_eq!(config.architecture(), GpuArchitecture::Gcn5);
        assert_eq!(config.target_features(), "-code-object-v3");
    }

    #[test]
    fn test_low_opt_levels_rejected() {
        for level in [0, 1] {
            let err = BackendConfig::new().with_opt_level(level).validate().unwrap_err();
            assert!(err.to_string().contains("unoptimized"));
        }
        assert!(BackendConfig::new().with_opt_level(4).validate().is_err());
        assert!(BackendConfig::new().with_opt_level(2).validate().is_ok());
    }

    #[test]
    fn test_codegen_opt_level_mapping() {
        let level = |l| BackendConfig::new().with_opt_level(l).codegen_opt_level();
        assert_eq!(level(0), CodegenOptLevel::None);
        assert_eq!(level(1), CodegenOptLevel::Less);
        assert_eq!(level(2), CodegenOptLevel::Default);
        assert_eq!(level(3), CodegenOptLevel::Aggressive);
        assert_eq!(level(7), CodegenOptLevel::None);
    }

    #[test]
    fn test_pass_pipeline() {
        let p3 = BackendConfig::new().pass_pipeline();
        assert_eq!(p3.inliner, InlinerPolicy::Threshold(1_048_576));
        assert!(!p3.disable_unroll_loops);
        assert!(p3.loop_vectorize && p3.slp_vectorize && p3.extra_sroa);

        let p1 = BackendConfig::new().with_opt_level(1).pass_pipeline();
        assert_eq!(p1.inliner, InlinerPolicy::AlwaysInlineOnly);
        assert!(p1.loop_vectorize);
        assert!(!p1.slp_vectorize);

        let p0 = BackendConfig::new().with_opt_level(0).pass_pipeline();
        assert!(p0.disable_unroll_loops);
        assert!(!p0.loop_vectorize && !p0.extra_sroa);

        let small = BackendConfig::new().pass_pipeline_with_size_level(2);
        assert!(!small.slp_vectorize);
    }

    #[test]
    fn test_rocdl_bitcode_paths() {
        let config = BackendConfig::new()
            .with_amdgpu_version(906)
            .with_rocdl_dir("/rocm/lib");
        let paths = config.rocdl_bitcode_paths();
        assert_eq!(paths.len(), 9);
        assert_eq!(paths[0], PathBuf::from("/rocm/lib/hc.amdgcn.bc"));
        assert_eq!(
            paths[8],
            PathBuf::from("/rocm/lib/oclc_isa_version_906.amdgcn.bc")
        );
    }

    #[test]
    fn test_missing_bitcodes_in_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ocml.amdgcn.bc"), b"BC").unwrap();
        let config = BackendConfig::new().with_rocdl_dir(dir.path());
        let missing = config.missing_rocdl_bitcodes();
        assert_eq!(missing.len(), 8);
        assert!(!missing.contains(&dir.path().join("ocml.amdgcn.bc")));
    }

    #[test]
    fn test_needs_rocdl() {
        let config = BackendConfig::new();
        let mut module = DeviceModule::new("m");
        module
            .get_or_insert_function(
                "llvm.amdgcn.workitem.id.x",
                FunctionType::new(IrType::i32(), vec![]),
            )
            .unwrap();
        assert!(!config.needs_rocdl(&module));
        module
            .get_or_insert_function(
                "__ockl_readuplane_i32",
                FunctionType::new(IrType::i32(), vec![IrType::i32(), IrType::i32()]),
            )
            .unwrap();
        assert!(config.needs_rocdl(&module));
    }

    #[test]
    fn test_target_triple_resolution() {
        let config = BackendConfig::new();
        let bare = DeviceModule::new("m");
        assert_eq!(config.resolve_target_triple(&bare), DEFAULT_TARGET_TRIPLE);
        let tagged = DeviceModule::new("m").with_target_triple("amdgcn-amd-amdhsa");
        let options = config.target_machine_options(&tagged);
        assert_eq!(options.triple, "amdgcn-amd-amdhsa");
        assert_eq!(options.cpu, "gfx900");
        assert_eq!(options.fp_op_fusion, FpOpFusion::Fast);
    }

    #[test]
    fn test_temp_product_name() {
        assert_eq!(temp_product_name("/tmp/build/module.ll", "bc"), "module.bc");
        assert_eq!(temp_product_name("kernel", ".hsaco"), "kernel.hsaco");
        assert_eq!(temp_product_name("a/b.c.ll", "o"), "b.c.o");
    }

    #[test]
    #[serial]
    fn test_from_env() {
        env::set_var("ROCMLOWER_AMDGPU_VERSION", "gfx1030");
        env::set_var("ROCMLOWER_OPT_LEVEL", "two");
        env::set_var("ROCMLOWER_ROCDL_DIR", "/custom/rocdl");
        env::remove_var("ROCMLOWER_TARGET_TRIPLE");
        let config = BackendConfig::from_env();
        env::remove_var("ROCMLOWER_AMDGPU_VERSION");
        env::remove_var("ROCMLOWER_OPT_LEVEL");
        env::remove_var("ROCMLOWER_ROCDL_DIR");

        assert_eq!(config.amdgpu_version, 1030);
        assert_eq!(config.opt_level, DEFAULT_OPT_LEVEL);
        assert_eq!(config.rocdl_dir, PathBuf::from("/custom/rocdl"));
        assert_eq!(config.target_triple, DEFAULT_TARGET_TRIPLE);
        assert_eq!(config.architecture(), GpuArchitecture::Rdna2);
    }

    #[test]
    fn test_with_override() {
        let base = BackendConfig::new();
        let tuned = base.with_override(|c| c.inline_threshold = 275);
        assert_eq!(tuned.pass_pipeline().inliner, InlinerPolicy::Threshold(275));
        assert_eq!(base.inline_threshold, DEFAULT_INLINE_THRESHOLD);
    }
}
