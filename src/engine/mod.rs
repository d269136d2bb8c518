//! The template engine: `${...}` expression evaluation over document trees.
//!
//! The engine is CPU-bound, thread-safe, and shared across reconcilers.
//! Compiled programs are cached per (environment, source) pair so repeated
//! renders of the same templates skip parsing entirely.

mod builtins;
mod cache;
mod errors;
mod eval;
mod lex;
mod parse;
mod scan;
mod template;
mod value;

pub use builtins::{hash_hex8, DNS_LABEL_MAX};
pub use cache::{ENV_CACHE_CAPACITY, PROGRAM_CACHE_CAPACITY};
pub use errors::{EngineError, EngineResult};
pub use eval::{TypeEnv, VarScope};
pub use value::{TypeDesc, Value};

use std::sync::Arc;

use crate::domain::raw::RawDoc;

use cache::{EnvCache, ProgramCache};
use parse::Expr;

/// Shared expression engine with environment and program caches.
pub struct TemplateEngine {
    env_cache: EnvCache,
    program_cache: ProgramCache,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Engine with default cache capacities.
    pub fn new() -> Self {
        Self::with_capacities(cache::ENV_CACHE_CAPACITY, cache::PROGRAM_CACHE_CAPACITY)
    }

    /// Engine with explicit cache capacities.
    pub fn with_capacities(env_capacity: usize, program_capacity: usize) -> Self {
        Self {
            env_cache: EnvCache::new(env_capacity),
            program_cache: ProgramCache::new(program_capacity),
        }
    }

    /// Evaluate one expression body (no `${}` wrapper) against a variable
    /// scope, returning its native value.
    pub fn eval_expression(&self, source: &str, vars: &VarScope) -> EngineResult<Value> {
        let (env_key, env) = self.env_for(vars);
        let program = self.program_for(&env_key, source, &env)?;
        eval::eval(&program, &mut eval::Scope::new(vars))
    }

    /// Compile an expression without evaluating it. Used by admission to
    /// reject uncompilable rules before they are stored.
    pub fn compile_expression(&self, source: &str, vars: &VarScope) -> EngineResult<()> {
        let (env_key, env) = self.env_for(vars);
        self.program_for(&env_key, source, &env).map(|_| ())
    }

    /// Compile every expression embedded in a template document without
    /// evaluating any of them. Admission uses this to reject uncompilable
    /// templates before they are stored.
    pub fn compile_template(&self, doc: &RawDoc, vars: &VarScope) -> EngineResult<()> {
        match doc {
            RawDoc::String(raw) => {
                for segment in scan::scan(raw)? {
                    if let scan::Segment::Expr(source) = segment {
                        self.compile_expression(&source, vars)?;
                    }
                }
                Ok(())
            }
            RawDoc::List(items) => items
                .iter()
                .try_for_each(|item| self.compile_template(item, vars)),
            RawDoc::Map(entries) => entries.iter().try_for_each(|(key, value)| {
                self.compile_template(&RawDoc::String(key.clone()), vars)?;
                self.compile_template(value, vars)
            }),
            _ => Ok(()),
        }
    }

    /// Render a template document against a variable scope. The result has
    /// `omit()` sentinels (and the fields/elements carrying them) removed;
    /// containers emptied by the removal remain as empty maps/lists.
    pub fn render(&self, doc: &RawDoc, vars: &VarScope) -> EngineResult<RawDoc> {
        template::render_value(self, doc, vars)?.into_doc()
    }

    /// Render to the raw value tree, sentinels intact. The rendering
    /// pipeline uses this when it needs to inspect sentinel placement.
    pub fn render_to_value(&self, doc: &RawDoc, vars: &VarScope) -> EngineResult<Value> {
        template::render_value(self, doc, vars)
    }

    /// Number of cached compile environments (test observability).
    pub fn cached_environments(&self) -> usize {
        self.env_cache.len()
    }

    /// Number of cached programs (test observability).
    pub fn cached_programs(&self) -> usize {
        self.program_cache.len()
    }

    /// Resolve the compile environment for a scope, through the cache.
    /// The key is the sorted set of variable names; values do not
    /// participate.
    fn env_for(&self, vars: &VarScope) -> (String, Arc<TypeEnv>) {
        let key = EnvCache::key_for(vars.keys().cloned());
        if let Some(env) = self.env_cache.get(&key) {
            return (key, env);
        }
        let env = Arc::new(eval::infer_env(vars));
        self.env_cache.insert(key.clone(), env.clone());
        (key, env)
    }

    /// Resolve a compiled program through the cache. Parsing and checking
    /// happen outside the cache lock.
    fn program_for(
        &self,
        env_key: &str,
        source: &str,
        env: &TypeEnv,
    ) -> EngineResult<Arc<Expr>> {
        if let Some(program) = self.program_cache.get(env_key, source) {
            return Ok(program);
        }
        let parsed = parse::parse(source)?;
        eval::check(&parsed, env)?;
        let program = Arc::new(parsed);
        self.program_cache
            .insert(env_key.to_string(), source.to_string(), program.clone());
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn scope(entries: &[(&str, Value)]) -> VarScope {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect::<IndexMap<_, _>>()
    }

    #[test]
    fn test_program_cache_hit_across_evaluations() {
        let engine = TemplateEngine::new();
        let vars = scope(&[("x", Value::Int(1))]);

        engine.eval_expression("x + 1", &vars).unwrap();
        assert_eq!(engine.cached_programs(), 1);
        assert_eq!(engine.cached_environments(), 1);

        // Same expression, same variable shape: no new entries.
        engine.eval_expression("x + 1", &vars).unwrap();
        assert_eq!(engine.cached_programs(), 1);
        assert_eq!(engine.cached_environments(), 1);

        // Same names with different values share the environment.
        let other_values = scope(&[("x", Value::Int(99))]);
        engine.eval_expression("x + 1", &other_values).unwrap();
        assert_eq!(engine.cached_environments(), 1);
    }

    #[test]
    fn test_distinct_var_shapes_get_distinct_environments() {
        let engine = TemplateEngine::new();
        engine
            .eval_expression("x", &scope(&[("x", Value::Int(1))]))
            .unwrap();
        engine
            .eval_expression("y", &scope(&[("y", Value::Int(1))]))
            .unwrap();
        assert_eq!(engine.cached_environments(), 2);
        assert_eq!(engine.cached_programs(), 2);
    }

    #[test]
    fn test_syntax_errors_not_cached() {
        let engine = TemplateEngine::new();
        let vars = scope(&[("x", Value::Int(1))]);
        assert!(engine.eval_expression("x +", &vars).is_err());
        assert_eq!(engine.cached_programs(), 0);
    }

    #[test]
    fn test_compile_expression_checks_without_evaluating() {
        let engine = TemplateEngine::new();
        let vars = scope(&[("params", Value::Map(IndexMap::new()))]);
        // Compiles fine even though evaluation would be missing-data.
        engine
            .compile_expression("params.replicas > 0", &vars)
            .unwrap();
        // Unknown function fails at compile.
        assert!(engine.compile_expression("nope(params)", &vars).is_err());
    }
}
