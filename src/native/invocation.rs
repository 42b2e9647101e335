use std::path::PathBuf;

use uuid::Uuid;

use crate::{
    config::{Layout, SolverSettings},
    constants::INSTANCE_EXT,
    core::{domain::RunDescriptor, traits::solver::Invocation},
};

const OPERATOR_COUNTING: &str = "operatorcounting";
const OPERATOR_COUNTING_CALL: &str = concat!(
    "operatorcounting([",
    "lmcut_constraints(), ",
    "pho_constraints(patterns=systematic(2)), ",
    "state_equation_constraints()",
    "])"
);
const SEARCH_ENGINE: &str = "pea_ida";

/// Command line of the planner driver script.
#[derive(Clone, Debug)]
pub struct DriverInvocation {
    settings: SolverSettings,
    instances_dir: PathBuf,
    trash_dir: PathBuf,
}

impl DriverInvocation {
    pub fn new(settings: SolverSettings, layout: &Layout) -> Self {
        Self {
            settings,
            instances_dir: layout.instances(),
            trash_dir: layout.trash(),
        }
    }

    fn pddl(&self, run: &RunDescriptor, name: &str) -> String {
        self.instances_dir
            .join(&run.configuration.suite)
            .join(&run.domain)
            .join(format!("{name}.{INSTANCE_EXT}"))
            .display()
            .to_string()
    }

    fn heuristic_call(heuristic: &str) -> String {
        if heuristic == OPERATOR_COUNTING {
            OPERATOR_COUNTING_CALL.to_string()
        } else {
            format!("{heuristic}()")
        }
    }
}

impl Invocation for DriverInvocation {
    fn arguments(&self, run: &RunDescriptor) -> Vec<String> {
        let configuration = &run.configuration;
        // the driver gets 20% slack over the configured budget
        let search_time_limit = u128::from(run.time_limit_seconds) * 6 / 5;
        let sas_file = self.trash_dir.join(format!("{}.sas", Uuid::new_v4()));

        let mut args = vec![
            self.settings.program.clone(),
            self.settings.driver.clone(),
            "--validate".to_string(),
            "--overall-memory-limit".to_string(),
            configuration.memory_limit.to_string(),
            "--translate-time-limit".to_string(),
            configuration.time_limit.to_string(),
            "--sas-file".to_string(),
            sas_file.display().to_string(),
            self.pddl(run, &run.domain_file),
            self.pddl(run, &run.instance),
            "--search".to_string(),
            format!(
                "{SEARCH_ENGINE}({})",
                Self::heuristic_call(&configuration.heuristic)
            ),
            "--time-limit".to_string(),
            search_time_limit.to_string(),
        ];

        if let Some(open_limit) = run.open_limit {
            args.extend(["--open-limit".to_string(), open_limit.to_string()]);
        }
        if run.uses_partial_expansion() {
            args.push("--partial-expansion".to_string());
        }
        if let Some(bound) = run.second_phase_lower_bound {
            args.extend(["--second-phase-lower-bound".to_string(), bound.to_string()]);
        }

        args
    }
}
