//! Built-in experiment schema.
//!
//! `MetaCfg` is the root: its `task` oneof selects one task message. Task
//! messages share reusable pieces (`Launcher`, `DatasetParams`, `Agent`) that
//! configs usually pull in through includes.

use super::{
    EnumDescriptor, FieldDescriptor as F, MessageDescriptor as M, PrimitiveType as P,
    SchemaRegistry,
};
use crate::config::Value;
use std::sync::LazyLock;

static BUILTIN: LazyLock<SchemaRegistry> = LazyLock::new(|| {
    SchemaRegistry::new("MetaCfg", messages(), enums())
        .unwrap_or_else(|e| panic!("built-in schema is inconsistent: {}", e))
});

/// The process-wide built-in registry, built on first use.
pub fn builtin() -> &'static SchemaRegistry {
    &BUILTIN
}

fn int(n: i64) -> Value {
    Value::Int(n)
}

fn float(x: f64) -> Value {
    Value::Float(x)
}

fn string(s: &str) -> Value {
    Value::Str(s.to_string())
}

fn enums() -> Vec<EnumDescriptor> {
    vec![EnumDescriptor::new(
        "Power",
        &[
            ("AUSTRIA", 0),
            ("ENGLAND", 1),
            ("FRANCE", 2),
            ("GERMANY", 3),
            ("ITALY", 4),
            ("RUSSIA", 5),
            ("TURKEY", 6),
        ],
    )]
}

fn messages() -> Vec<M> {
    vec![
        M::new("MetaCfg")
            .with_selector("task")
            .with_field(F::message("train", 10, "TrainTask").in_oneof("task"))
            .with_field(F::message("compare_agents", 11, "CompareAgentsTask").in_oneof("task"))
            .with_field(F::message("situation_check", 12, "SituationCheckTask").in_oneof("task"))
            .with_field(F::message("build_db_cache", 13, "BuildDbCacheTask").in_oneof("task"))
            .with_field(F::message("profile_model", 14, "ProfileModelTask").in_oneof("task")),
        M::new("Launcher")
            .with_field(F::message("local", 1, "LocalLauncher").in_oneof("launcher"))
            .with_field(F::message("slurm", 2, "SlurmLauncher").in_oneof("launcher")),
        M::new("LocalLauncher")
            .with_field(F::primitive("use_local", 1, P::Bool).with_default(Value::Bool(true))),
        M::new("SlurmLauncher")
            .with_field(F::primitive("num_gpus", 1, P::Int32).with_default(int(0)))
            .with_field(F::primitive("num_nodes", 2, P::Int32).with_default(int(1)))
            .with_field(F::primitive("partition", 3, P::String).with_default(string("learnfair")))
            .with_field(F::primitive("hours", 4, P::Int32).with_default(int(72)))
            .with_field(F::primitive("cpus_per_gpu", 5, P::Int32).with_default(int(10)))
            .with_field(F::primitive("mem_per_gpu", 6, P::Int32).with_default(int(62)))
            .with_field(F::primitive("constraint", 7, P::String)),
        M::new("DatasetParams")
            .with_field(
                F::primitive("value_decay_alpha", 1, P::Float)
                    .with_default(float(1.0))
                    .bounded(0.0, 1.0),
            )
            .with_field(F::primitive("data_cache", 2, P::String).repeated().append_on_merge())
            .with_field(
                F::primitive("min_rating_percentile", 3, P::Float)
                    .with_default(float(0.0))
                    .bounded(0.0, 1.0),
            )
            .with_field(F::primitive("only_with_min_final_score", 4, P::Int32).with_default(int(7)))
            .with_field(F::primitive("exclude_n_holds", 5, P::Int32).with_default(int(-1)))
            .with_field(F::primitive("metadata_path", 6, P::String)),
        M::new("TrainTask")
            .with_field(F::message("dataset_params", 1, "DatasetParams"))
            .with_field(F::primitive("batch_size", 2, P::Int32).required())
            .with_field(F::primitive("lr", 3, P::Float).with_default(float(0.001)))
            .with_field(F::primitive("lr_decay", 4, P::Float).with_default(float(1.0)))
            .with_field(F::primitive("clip_grad_norm", 5, P::Float).with_default(float(0.5)))
            .with_field(F::primitive("checkpoint", 6, P::String).with_default(string("./checkpoint.pth")))
            .with_field(F::primitive("num_epochs", 7, P::Int32).with_default(int(1000)))
            .with_field(F::primitive("num_encoder_blocks", 8, P::Int32).with_default(int(8)))
            .with_field(F::primitive("debug_no_mp", 9, P::Bool).with_default(Value::Bool(false)))
            .with_field(
                F::primitive("value_loss_weight", 10, P::Float)
                    .with_default(float(0.7))
                    .bounded(0.0, 1.0),
            )
            .with_field(F::primitive("data_cache", 11, P::String))
            .with_field(F::message("launcher", 100, "Launcher")),
        M::new("Agent")
            .with_field(F::message("model_sampled", 1, "ModelSampledAgent").in_oneof("agent"))
            .with_field(F::message("searchbot", 2, "SearchBotAgent").in_oneof("agent"))
            .with_field(F::message("random", 3, "RandomAgent").in_oneof("agent")),
        M::new("ModelSampledAgent")
            .with_field(F::primitive("model_path", 1, P::String).required())
            .with_field(F::primitive("temperature", 2, P::Float).with_default(float(0.1)))
            .with_field(
                F::primitive("top_p", 3, P::Float)
                    .with_default(float(1.0))
                    .bounded(0.0, 1.0),
            ),
        M::new("SearchBotAgent")
            .with_field(F::primitive("model_path", 1, P::String).required())
            .with_field(F::primitive("n_rollouts", 2, P::Int32).with_default(int(100)))
            .with_field(F::primitive("max_rollout_length", 3, P::Int32).with_default(int(3)))
            .with_field(F::primitive("n_rollout_procs", 4, P::Int32).with_default(int(70)))
            .with_field(F::primitive("share_strategy", 5, P::Bool).with_default(Value::Bool(false)))
            .with_field(
                F::primitive("rollout_temperature", 6, P::Float)
                    .with_default(float(0.75))
                    .bounded(0.0, 10.0),
            ),
        M::new("RandomAgent"),
        M::new("CompareAgentsTask")
            .with_field(F::message("agent_one", 1, "Agent").required())
            .with_field(F::message("agent_six", 2, "Agent").required())
            .with_field(F::message("cf_agent", 3, "Agent"))
            .with_field(F::enumeration("power_one", 4, "Power").with_default(Value::Enum("AUSTRIA".into())))
            .with_field(F::primitive("seed", 5, P::Int32).with_default(int(-1)))
            .with_field(F::primitive("num_processes", 6, P::Int32).with_default(int(0)))
            .with_field(F::primitive("num_trials", 7, P::Int32).with_default(int(0)))
            .with_field(F::primitive("start_game", 8, P::String))
            .with_field(F::primitive("start_phase", 9, P::String).with_default(string("S1901M")))
            .with_field(F::primitive("max_turns", 10, P::Int32).with_default(int(0)))
            .with_field(F::primitive("max_year", 11, P::Int32).with_default(int(1935)))
            .with_field(F::primitive("out", 12, P::String))
            .with_field(F::primitive("use_shared_agent", 13, P::Bool).with_default(Value::Bool(false)))
            .with_field(F::message("launcher", 100, "Launcher")),
        M::new("SituationCheckTask")
            .with_field(F::message("agent", 1, "Agent").required())
            .with_field(F::primitive("situation_json", 2, P::String).with_default(string("test_situations.json")))
            .with_field(F::primitive("selection", 3, P::String))
            .with_field(F::primitive("single_game", 4, P::String))
            .with_field(F::primitive("single_phase", 5, P::String))
            .with_field(F::primitive("seed", 6, P::Int32).with_default(int(0)))
            .with_field(F::primitive("extra_plausible_orders", 7, P::String)),
        M::new("BuildDbCacheTask")
            .with_field(F::primitive("glob", 1, P::String).required())
            .with_field(F::primitive("out_path", 2, P::String).required())
            .with_field(F::message("dataset_params", 3, "DatasetParams"))
            .with_field(F::primitive("n_jobs", 4, P::Int32).with_default(int(20)))
            .with_field(F::message("launcher", 100, "Launcher")),
        M::new("ProfileModelTask")
            .with_field(F::primitive("model_path", 1, P::String).required()),
    ]
}
