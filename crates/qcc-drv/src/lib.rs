//! qcc-drv - Compiler Driver
//!
//! The entry point and orchestrator for the compile pipeline:
//!
//! 1. Parse command-line flags into a [`Config`].
//! 2. For each input file, run the phases in strict order: lexing +
//!    preprocessing, parsing, semantic analysis, AST optimization to
//!    fixpoint, lowering to SSA IR, and backend assembly emission.
//! 3. Stop early for `-E` (token stream), `-fsyntax-only`, and
//!    `-ast-dump`.
//! 4. Print diagnostics in source order with the closing
//!    `N error(s), M warning(s)` summary, and exit 0 on success, 1 on
//!    compile errors, 2 on usage errors.
//!
//! Every phase boundary checks the error counter: a phase that found
//! errors stops the pipeline for that file, so later phases only ever
//! see well-formed input.

mod ast_dump;

use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;

use qcc_gen::backend_for;
use qcc_ir::lower_unit;
use qcc_opt::{OptLevel, PassManager};
use qcc_par::Parser;
use qcc_pp::{spell_tokens, FsLoader, Preprocessor};
use qcc_sem::SemanticAnalyzer;
use qcc_util::{Arch, CompileArena, Feature, Handler, SourceMap, Standard};

/// Where the pipeline stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopPhase {
    /// `-E`: emit the preprocessed token stream.
    Preprocess,
    /// `-fsyntax-only`: stop after parsing.
    SyntaxOnly,
    /// `-ast-dump`: stop after semantic analysis, emit the tree.
    AstDump,
    /// Run the whole pipeline to assembly.
    Full,
}

/// Driver configuration, assembled from command-line flags.
#[derive(Debug)]
pub struct Config {
    pub inputs: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub standard: Standard,
    pub arch: Arch,
    pub opt_level: u8,
    pub stop: StopPhase,
    pub include_paths: Vec<PathBuf>,
    pub defines: Vec<String>,
    pub warn_all: bool,
    pub warn_extra: bool,
    pub warnings_as_errors: bool,
    pub verbose: bool,
    pub enabled_features: Vec<Feature>,
    pub disabled_features: Vec<Feature>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            output: None,
            standard: Standard::default(),
            arch: Arch::default(),
            opt_level: 0,
            stop: StopPhase::Full,
            include_paths: Vec::new(),
            defines: Vec::new(),
            warn_all: false,
            warn_extra: false,
            warnings_as_errors: false,
            verbose: false,
            enabled_features: Vec::new(),
            disabled_features: Vec::new(),
        }
    }
}

pub const USAGE: &str = "\
usage: qcc [options] file...
options:
  -o <file>          write output to <file> (default stdout)
  -std=<name>        select the language standard (c89..c23, gnu variants)
  -arch=<name>       target architecture (x86, x86_64, 370, 390, z, ppc64, arm64, ...)
  -O<0..3>           optimization level
  -E                 stop after preprocessing, emit the token stream
  -fsyntax-only      stop after parsing
  -ast-dump          stop after semantic analysis, emit the AST
  -I<path>           add an include search path
  -D<name>[=<val>]   predefine a macro
  -fenable-<feat>    force-enable a language feature
  -fdisable-<feat>   force-disable a language feature
  -Wall -Wextra      warning controls
  -Werror            treat warnings as errors
  -v                 verbose output";

impl Config {
    /// Parse command-line arguments. Errors are usage errors (exit 2).
    pub fn parse(args: &[String]) -> Result<Config, String> {
        let mut config = Config::default();
        let mut iter = args.iter().peekable();
        while let Some(arg) = iter.next() {
            if arg == "-o" {
                let path = iter
                    .next()
                    .ok_or_else(|| "missing file name after '-o'".to_owned())?;
                config.output = Some(PathBuf::from(path));
            } else if let Some(name) = arg.strip_prefix("-std=") {
                config.standard = Standard::from_name(name)
                    .ok_or_else(|| format!("unknown language standard '{}'", name))?;
            } else if let Some(name) = arg.strip_prefix("-arch=") {
                config.arch = Arch::from_name(name)
                    .ok_or_else(|| format!("unknown target architecture '{}'", name))?;
            } else if let Some(level) = arg.strip_prefix("-O") {
                config.opt_level = level
                    .parse::<u8>()
                    .map_err(|_| format!("invalid optimization level '{}'", arg))?;
            } else if arg == "-E" {
                config.stop = StopPhase::Preprocess;
            } else if arg == "-fsyntax-only" {
                config.stop = StopPhase::SyntaxOnly;
            } else if arg == "-ast-dump" {
                config.stop = StopPhase::AstDump;
            } else if let Some(feat) = arg.strip_prefix("-fenable-") {
                config.enabled_features.push(
                    Feature::from_name(feat)
                        .ok_or_else(|| format!("unknown language feature '{}'", feat))?,
                );
            } else if let Some(feat) = arg.strip_prefix("-fdisable-") {
                config.disabled_features.push(
                    Feature::from_name(feat)
                        .ok_or_else(|| format!("unknown language feature '{}'", feat))?,
                );
            } else if let Some(path) = arg.strip_prefix("-I") {
                if path.is_empty() {
                    let path = iter
                        .next()
                        .ok_or_else(|| "missing path after '-I'".to_owned())?;
                    config.include_paths.push(PathBuf::from(path));
                } else {
                    config.include_paths.push(PathBuf::from(path));
                }
            } else if let Some(def) = arg.strip_prefix("-D") {
                if def.is_empty() {
                    let def = iter
                        .next()
                        .ok_or_else(|| "missing macro after '-D'".to_owned())?;
                    config.defines.push(def.clone());
                } else {
                    config.defines.push(def.to_owned());
                }
            } else if arg == "-Wall" {
                config.warn_all = true;
            } else if arg == "-Wextra" {
                config.warn_extra = true;
            } else if arg == "-Werror" {
                config.warnings_as_errors = true;
            } else if arg == "-v" || arg == "--verbose" {
                config.verbose = true;
            } else if arg.starts_with('-') {
                return Err(format!("unknown option '{}'", arg));
            } else {
                config.inputs.push(PathBuf::from(arg));
            }
        }
        if config.inputs.is_empty() {
            return Err("no input files".to_owned());
        }
        if config.output.is_some() && config.inputs.len() > 1 {
            return Err("cannot use '-o' with multiple input files".to_owned());
        }
        Ok(config)
    }

    /// The effective feature set: the standard's base descriptor with
    /// user overrides applied.
    pub fn features(&self) -> qcc_util::FeatureSet {
        let mut features = self.standard.features();
        for feature in &self.enabled_features {
            features.enable(*feature);
        }
        for feature in &self.disabled_features {
            features.disable(*feature);
        }
        features
    }
}

/// Errors that abort a compile job outright (as opposed to diagnostics,
/// which accumulate on the session handler).
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("cannot read '{0}': {1}")]
    Io(PathBuf, std::io::Error),

    #[error(transparent)]
    Gen(#[from] qcc_gen::GenError),
}

/// Compilation session: one invocation of the compiler.
pub struct Session {
    pub config: Config,
    pub sources: SourceMap,
    pub handler: Handler,
    /// Compile-job arena; long-lived byte data shares its lifetime.
    pub arena: CompileArena,
}

impl Session {
    pub fn new(config: Config) -> Self {
        let handler = Handler::new();
        handler.set_warnings_as_errors(config.warnings_as_errors);
        Self {
            config,
            sources: SourceMap::new(),
            handler,
            arena: CompileArena::new(),
        }
    }

    /// Compile every input, returning the concatenated output bytes.
    /// Diagnostics accumulate on the handler; a file that reports errors
    /// contributes no output.
    pub fn compile(&mut self) -> Result<Vec<u8>, CompileError> {
        let mut output = Vec::new();
        let inputs = self.config.inputs.clone();
        for path in &inputs {
            if self.config.verbose {
                eprintln!("qcc: compiling {}", path.display());
            }
            if let Some(mut bytes) = self.compile_file(path)? {
                output.append(&mut bytes);
            }
            if self.handler.has_fatal() {
                break;
            }
        }
        Ok(output)
    }

    /// Run the pipeline over one translation unit. `None` means
    /// diagnostics stopped it at a phase boundary.
    fn compile_file(&mut self, path: &Path) -> Result<Option<Vec<u8>>, CompileError> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| CompileError::Io(path.to_owned(), err))?;
        // The display name outlives every phase; it lives in the job
        // arena like the rest of the long-lived byte data.
        let file_name = self.arena.alloc_str(&path.display().to_string());
        let file = self.sources.add_file(file_name, text);
        let features = self.config.features();

        // Phase 1+2: lexing and preprocessing.
        let loader = FsLoader;
        let tokens = {
            let mut pp = Preprocessor::new(
                file,
                features,
                &self.handler,
                &mut self.sources,
                &loader,
            );
            for dir in &self.config.include_paths {
                pp.add_include_path(dir.clone());
            }
            for def in &self.config.defines {
                pp.define_cmdline(def);
            }
            pp.run()
        };
        if self.config.stop == StopPhase::Preprocess {
            let mut text = spell_tokens(&tokens);
            if !text.ends_with('\n') {
                text.push('\n');
            }
            return Ok(Some(text.into_bytes()));
        }
        if self.handler.has_errors() {
            return Ok(None);
        }

        // Phase 3: parsing.
        let mut parser = Parser::new(tokens, features, &self.handler);
        let mut unit = parser.parse();
        if self.config.stop == StopPhase::SyntaxOnly {
            return Ok(Some(Vec::new()));
        }
        if self.handler.has_errors() {
            return Ok(None);
        }

        // Phase 4: semantic analysis.
        let data_model = self.config.arch.data_model();
        let mut sema = SemanticAnalyzer::new(data_model, features, &self.handler);
        sema.run(&unit);
        if self.handler.has_errors() {
            return Ok(None);
        }
        if self.config.stop == StopPhase::AstDump {
            let dump = ast_dump::dump_unit(&unit, &sema.types, &self.sources);
            return Ok(Some(dump.into_bytes()));
        }

        // Phase 5: AST optimization to fixpoint.
        let mut passes = PassManager::new(OptLevel::from_cli(self.config.opt_level));
        passes.set_verbose(self.config.verbose);
        passes.run(&mut unit, Some(&sema.types));
        if self.config.verbose {
            eprintln!(
                "qcc: optimizer: {} mutation(s) in {} iteration(s)",
                passes.total_mutations, passes.iterations
            );
            for note in &passes.notes {
                eprintln!("qcc: {}", note);
            }
        }

        // Phase 6: lowering to IR.
        let module = lower_unit(&unit, &sema.types, &sema.symtab, file_name);

        // Backend emission.
        let backend = backend_for(self.config.arch)?;
        let asm = backend.emit(&module)?;
        Ok(Some(asm))
    }
}

/// Run the driver over pre-split arguments. Returns the process exit
/// code: 0 success, 1 compile errors, 2 usage errors.
pub fn run(args: Vec<String>) -> anyhow::Result<i32> {
    let config = match Config::parse(&args) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("qcc: error: {}", message);
            eprintln!("{}", USAGE);
            return Ok(2);
        }
    };
    let output_path = config.output.clone();
    let mut session = Session::new(config);

    let result = session.compile();

    // Diagnostics print in source order; the summary closes the job.
    eprint!("{}", session.handler.render_all(&session.sources));
    if session.handler.error_count() > 0 || session.handler.warning_count() > 0 {
        eprintln!("{}", session.handler.summary());
    }

    let output = match result {
        Ok(output) => output,
        Err(err) => {
            eprintln!("qcc: error: {}", err);
            return Ok(1);
        }
    };

    if session.handler.has_errors() {
        return Ok(1);
    }

    match output_path {
        Some(path) => {
            std::fs::write(&path, &output)
                .with_context(|| format!("cannot write '{}'", path.display()))?;
        }
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(&output)
                .context("cannot write to stdout")?;
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_minimal() {
        let config = Config::parse(&args(&["main.c"])).expect("parses");
        assert_eq!(config.inputs, vec![PathBuf::from("main.c")]);
        assert_eq!(config.stop, StopPhase::Full);
        assert_eq!(config.opt_level, 0);
    }

    #[test]
    fn test_parse_flags() {
        let config = Config::parse(&args(&[
            "-o", "out.s", "-std=c99", "-arch=x86", "-O2", "-Iinc", "-DX=1", "-Wall",
            "-Werror", "main.c",
        ]))
        .expect("parses");
        assert_eq!(config.output, Some(PathBuf::from("out.s")));
        assert_eq!(config.standard, Standard::C99);
        assert_eq!(config.arch, Arch::X86);
        assert_eq!(config.opt_level, 2);
        assert_eq!(config.include_paths, vec![PathBuf::from("inc")]);
        assert_eq!(config.defines, vec!["X=1".to_owned()]);
        assert!(config.warn_all);
        assert!(config.warnings_as_errors);
    }

    #[test]
    fn test_parse_stop_phases() {
        assert_eq!(
            Config::parse(&args(&["-E", "a.c"])).expect("parses").stop,
            StopPhase::Preprocess
        );
        assert_eq!(
            Config::parse(&args(&["-fsyntax-only", "a.c"]))
                .expect("parses")
                .stop,
            StopPhase::SyntaxOnly
        );
        assert_eq!(
            Config::parse(&args(&["-ast-dump", "a.c"]))
                .expect("parses")
                .stop,
            StopPhase::AstDump
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(Config::parse(&args(&[])).is_err());
        assert!(Config::parse(&args(&["-std=c++20", "a.c"])).is_err());
        assert!(Config::parse(&args(&["-arch=mips", "a.c"])).is_err());
        assert!(Config::parse(&args(&["--frobnicate", "a.c"])).is_err());
        assert!(Config::parse(&args(&["-o"])).is_err());
        assert!(Config::parse(&args(&["-o", "x.s", "a.c", "b.c"])).is_err());
    }

    #[test]
    fn test_feature_overrides() {
        let config = Config::parse(&args(&[
            "-std=c89",
            "-fenable-line-comments",
            "a.c",
        ]))
        .expect("parses");
        assert!(config.features().contains(Feature::LineComments));
        let config = Config::parse(&args(&[
            "-std=c99",
            "-fdisable-line-comments",
            "a.c",
        ]))
        .expect("parses");
        assert!(!config.features().contains(Feature::LineComments));
    }

    #[test]
    fn test_separate_i_and_d() {
        let config =
            Config::parse(&args(&["-I", "inc", "-D", "A=2", "a.c"])).expect("parses");
        assert_eq!(config.include_paths, vec![PathBuf::from("inc")]);
        assert_eq!(config.defines, vec!["A=2".to_owned()]);
    }
}
