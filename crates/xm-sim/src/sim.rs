//! The `Simulation` struct: registration, population load, compile, run.

use std::path::Path;
use std::sync::Arc;

use xm_board::BoardManager;
use xm_core::plugin::{PopulationReader, PopulationSink};
use xm_core::{AgentSchema, PopReadError, ScalarValue};
use xm_exec::{
    EngineContext, FifoQueue, Scheduler, SplittingFifoQueue, TaskKind, TaskManager, TransitionFn,
};
use xm_mem::{MemError, MemoryManager};
use xm_model::{FunctionRegistry, ModelDef, compile_model, register_model, validate_model};

use crate::error::{SimError, SimResult};
use crate::observer::SimObserver;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Scheduler sizing knobs.
#[derive(Clone, Debug)]
pub struct SimConfig {
    /// Worker threads in the splitting queue serving agent tasks.
    pub slots: usize,
    /// Cap on sub-tasks per split; defaults to the slot count.
    pub max_tasks_per_split: Option<usize>,
    /// Minimum window width a split may produce; defaults to 50.
    pub min_vector_size: Option<usize>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            slots: std::thread::available_parallelism().map_or(1, |n| n.get()),
            max_tasks_per_split: None,
            min_vector_size: None,
        }
    }
}

// ── Simulation ────────────────────────────────────────────────────────────────

/// Build-time state: registries are exclusively owned until compilation
/// shares them with the worker pools.
enum Stage {
    Registering {
        memory: MemoryManager,
        boards: BoardManager,
    },
    Ready {
        ctx: Arc<EngineContext>,
        tasks: Arc<TaskManager>,
        scheduler: Scheduler,
    },
    /// Transient marker while moving between stages.
    Poisoned,
}

/// One simulation: a model, its transition functions, its population, and —
/// after [`compile`](Simulation::compile) — a runnable scheduler.
pub struct Simulation {
    model: ModelDef,
    registry: FunctionRegistry,
    stage: Stage,
    pending_sink: Option<Box<dyn PopulationSink>>,
    /// Iteration number the next `run_iteration` executes as; follows the
    /// `itno` of a loaded population.
    next_iteration: u64,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("next_iteration", &self.next_iteration)
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Validate `model` and register its agents, variables, and messages.
    pub fn new(model: ModelDef) -> SimResult<Self> {
        validate_model(&model)?;
        let mut memory = MemoryManager::new();
        let mut boards = BoardManager::new();
        register_model(&model, &mut memory, &mut boards)?;
        Ok(Self {
            model,
            registry: FunctionRegistry::new(),
            stage: Stage::Registering { memory, boards },
            pending_sink: None,
            next_iteration: 0,
        })
    }

    /// The model this simulation was built from.
    pub fn model(&self) -> &ModelDef {
        &self.model
    }

    /// The memory layout, as plugins discover it.
    pub fn schema(&self) -> AgentSchema {
        match &self.stage {
            Stage::Registering { memory, .. } => memory.schema(),
            Stage::Ready { ctx, .. } => ctx.memory().schema(),
            Stage::Poisoned => AgentSchema::new(),
        }
    }

    /// Register the Rust body of one transition function.
    pub fn register_transition(&mut self, agent: &str, function: &str, f: TransitionFn) {
        self.registry.register(agent, function, f);
    }

    /// Substitute no-op bodies for unregistered transition functions.
    pub fn allow_stub_functions(&mut self, allow: bool) {
        self.registry.allow_stubs = allow;
    }

    // ── Population ────────────────────────────────────────────────────────

    /// Load a population file through a reader plugin.  Must precede
    /// [`compile`](Simulation::compile).
    ///
    /// Returns the file's iteration number; the next iteration executed
    /// will be that number plus one.
    pub fn load_population(
        &mut self,
        reader: &mut dyn PopulationReader,
        path: &Path,
    ) -> SimResult<u64> {
        let Stage::Registering { memory, .. } = &self.stage else {
            return Err(SimError::InvalidState(
                "population must be loaded before compile".into(),
            ));
        };
        let mut add_int = |agent: &str, var: &str, v: i64| {
            memory
                .agent(agent)
                .and_then(|am| am.append_value(var, ScalarValue::Int(v)))
                .map_err(mem_to_pop)
        };
        let mut add_double = |agent: &str, var: &str, v: f64| {
            memory
                .agent(agent)
                .and_then(|am| am.append_value(var, ScalarValue::Double(v)))
                .map_err(mem_to_pop)
        };
        let iteration = reader.read_pop(path, &mut add_int, &mut add_double)?;
        memory.assert_columns_equal()?;
        self.next_iteration = iteration + 1;
        Ok(iteration)
    }

    /// Append one initial value in code (the programmatic alternative to a
    /// population file).  Must precede [`compile`](Simulation::compile).
    pub fn append_value(&mut self, agent: &str, var: &str, value: ScalarValue) -> SimResult<()> {
        let Stage::Registering { memory, .. } = &self.stage else {
            return Err(SimError::InvalidState(
                "population must be seeded before compile".into(),
            ));
        };
        memory.agent(agent)?.append_value(var, value)?;
        Ok(())
    }

    /// Install the population writer plugin driven by `pop_write` tasks.
    pub fn set_output(&mut self, sink: Box<dyn PopulationSink>) {
        match &self.stage {
            Stage::Ready { ctx, .. } => ctx.set_pop_sink(sink),
            _ => self.pending_sink = Some(sink),
        }
    }

    // ── Compilation ───────────────────────────────────────────────────────

    /// Lock the memory layout, compile the model into its execution DAG,
    /// and stand up the scheduler and worker pools.
    pub fn compile(&mut self, config: SimConfig) -> SimResult<()> {
        let (mut memory, boards) = match std::mem::replace(&mut self.stage, Stage::Poisoned) {
            Stage::Registering { memory, boards } => (memory, boards),
            other => {
                self.stage = other;
                return Err(SimError::InvalidState("simulation already compiled".into()));
            }
        };

        // Lock every agent's layout at its loaded population size.
        for agent in &self.model.agents {
            let population = memory.population_of(&agent.name)?;
            memory.hint_population_size(&agent.name, population)?;
        }
        memory.assert_columns_equal()?;

        let ctx = Arc::new(EngineContext::new(memory, boards));
        if let Some(sink) = self.pending_sink.take() {
            ctx.set_pop_sink(sink);
        }

        let tasks = Arc::new(compile_model(&self.model, &self.registry, &ctx)?);

        let slots = config.slots.max(1);
        let mut scheduler = Scheduler::new(Arc::clone(&tasks), Arc::clone(&ctx));
        let callback = scheduler.callback();

        let split = SplittingFifoQueue::new(
            slots,
            Arc::clone(&tasks),
            Arc::clone(&ctx),
            callback.clone(),
        )?;
        if let Some(max) = config.max_tasks_per_split {
            split.set_max_tasks_per_split(max)?;
        }
        if let Some(min) = config.min_vector_size {
            split.set_min_vector_size(min)?;
        }
        let fifo = FifoQueue::new(1, Arc::clone(&tasks), Arc::clone(&ctx), callback)?;

        let agent_queue = scheduler.add_queue(Box::new(split));
        let system_queue = scheduler.add_queue(Box::new(fifo));
        scheduler.assign(TaskKind::Function, agent_queue)?;
        scheduler.assign(TaskKind::Condition, agent_queue)?;
        for kind in [
            TaskKind::MsgSync,
            TaskKind::MsgClear,
            TaskKind::PopWrite,
            TaskKind::StartModel,
            TaskKind::FinishModel,
        ] {
            scheduler.assign(kind, system_queue)?;
        }
        scheduler.set_iteration(self.next_iteration);

        tracing::info!(
            model = %self.model.name,
            tasks = tasks.task_count(),
            slots,
            "simulation compiled"
        );
        self.stage = Stage::Ready {
            ctx,
            tasks,
            scheduler,
        };
        Ok(())
    }

    // ── Execution ─────────────────────────────────────────────────────────

    /// Run `iterations` full iterations, compacting dead agents and
    /// verifying the column-equality invariant at every boundary.
    pub fn run(&mut self, iterations: u64, observer: &mut dyn SimObserver) -> SimResult<()> {
        let Stage::Ready { ctx, scheduler, .. } = &self.stage else {
            return Err(SimError::InvalidState(
                "simulation must be compiled before running".into(),
            ));
        };
        for _ in 0..iterations {
            let iteration = scheduler.iteration();
            observer.on_iteration_start(iteration);
            scheduler.run_iteration()?;
            let compacted = ctx.memory().compact_all();
            ctx.memory().assert_columns_equal()?;
            observer.on_iteration_end(iteration, compacted);
        }
        observer.on_run_end(iterations);
        Ok(())
    }

    // ── Introspection ─────────────────────────────────────────────────────

    /// The engine context (compiled simulations only).
    pub fn context(&self) -> SimResult<&Arc<EngineContext>> {
        match &self.stage {
            Stage::Ready { ctx, .. } => Ok(ctx),
            _ => Err(SimError::InvalidState("simulation not compiled".into())),
        }
    }

    /// The compiled task graph (compiled simulations only).
    pub fn tasks(&self) -> SimResult<&Arc<TaskManager>> {
        match &self.stage {
            Stage::Ready { tasks, .. } => Ok(tasks),
            _ => Err(SimError::InvalidState("simulation not compiled".into())),
        }
    }
}

/// Map memory errors from the population-load callbacks into reader error
/// kinds.
fn mem_to_pop(e: MemError) -> PopReadError {
    match e {
        MemError::InvalidAgent(agent) => PopReadError::UnknownAgent {
            element_path: "memory".to_owned(),
            agent,
        },
        MemError::InvalidVariable { agent, var } => PopReadError::UnknownVariable {
            element_path: "memory".to_owned(),
            agent,
            var,
        },
        other => PopReadError::Malformed {
            path: String::new(),
            element_path: "memory".to_owned(),
            detail: other.to_string(),
        },
    }
}
