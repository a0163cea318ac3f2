//! Sample workflow specifications.
//!
//! Each function returns a fresh JSON document shaped the way the workflow
//! controller receives it from a client.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Name given to the sample workflows that carry one.
pub const SAMPLE_WORKFLOW_NAME: &str = "my_test_workflow";

/// Workflow engines the samples cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowType {
    Serial,
    Cwl,
    Yadage,
    Snakemake,
}

impl WorkflowType {
    /// Get the type string stored alongside workflow records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Cwl => "cwl",
            Self::Yadage => "yadage",
            Self::Snakemake => "snakemake",
        }
    }
}

impl std::str::FromStr for WorkflowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serial" => Ok(Self::Serial),
            "cwl" => Ok(Self::Cwl),
            "yadage" => Ok(Self::Yadage),
            "snakemake" => Ok(Self::Snakemake),
            other => Err(format!("unknown workflow type '{}'", other)),
        }
    }
}

/// A sample workflow submission.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowFixture {
    value: Value,
}

impl WorkflowFixture {
    fn new(value: Value) -> Self {
        Self { value }
    }

    /// The `reana_specification` part of the submission.
    pub fn reana_specification(&self) -> &Value {
        &self.value["reana_specification"]
    }

    /// Engine type declared in `reana_specification.workflow.type`.
    pub fn workflow_type(&self) -> Option<WorkflowType> {
        self.reana_specification()["workflow"]["type"]
            .as_str()
            .and_then(|t| t.parse().ok())
    }

    /// Workflow name, from either `workflow_name` or `name`. Empty names count
    /// as no name.
    pub fn name(&self) -> Option<&str> {
        self.value
            .get("workflow_name")
            .or_else(|| self.value.get("name"))
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
    }

    /// Borrow the raw document.
    pub fn as_value(&self) -> &Value {
        &self.value
    }

    /// Take the raw document.
    pub fn into_value(self) -> Value {
        self.value
    }
}

fn sample_inputs() -> Value {
    json!({"parameters": {"min_year": "1991", "max_year": "2001"}})
}

fn sample_specification() -> Value {
    json!({"first": "do this", "second": "do that"})
}

fn reana_specification(workflow_type: WorkflowType) -> Value {
    json!({
        "inputs": sample_inputs(),
        "workflow": {
            "specification": sample_specification(),
            "type": workflow_type.as_str(),
        },
        "type": workflow_type.as_str(),
    })
}

/// A serial workflow with a single step.
pub fn serial_workflow() -> WorkflowFixture {
    WorkflowFixture::new(json!({
        "reana_specification": {
            "workflow": {
                "specification": {
                    "steps": [
                        {
                            "environment": "docker.io/reanahub/reana-env-jupyter",
                            "commands": ["echo 'Hello REANA'"],
                        }
                    ]
                },
                "type": "serial",
            },
        },
    }))
}

/// CWL workflow with a name.
pub fn cwl_workflow_with_name() -> WorkflowFixture {
    WorkflowFixture::new(json!({
        "reana_specification": reana_specification(WorkflowType::Cwl),
        "workflow_name": SAMPLE_WORKFLOW_NAME,
    }))
}

/// CWL workflow without a name.
pub fn cwl_workflow_without_name() -> WorkflowFixture {
    WorkflowFixture::new(json!({
        "reana_specification": reana_specification(WorkflowType::Cwl),
        "name": "",
    }))
}

/// Yadage workflow with a name.
pub fn yadage_workflow_with_name() -> WorkflowFixture {
    WorkflowFixture::new(json!({
        "reana_specification": reana_specification(WorkflowType::Yadage),
        "name": SAMPLE_WORKFLOW_NAME,
    }))
}

/// Yadage workflow without a name.
pub fn yadage_workflow_without_name() -> WorkflowFixture {
    WorkflowFixture::new(json!({
        "reana_specification": reana_specification(WorkflowType::Yadage),
        "name": "",
    }))
}

fn root6_environment() -> Value {
    json!({
        "environment_type": "docker-encapsulated",
        "image": "docker.io/reanahub/reana-env-root6",
        "imagetag": "6.18.04",
        "resources": [],
        "envscript": "",
        "env": {},
        "workdir": null,
        "par_mounts": [],
    })
}

fn stage_output(step: &str, output: &str) -> Value {
    json!({
        "step": step,
        "output": output,
        "expression_type": "stage-output-selector",
    })
}

/// Nested yadage specification as loaded from `reana.yaml`.
pub fn yadage_workflow_spec_loaded() -> Value {
    json!({
        "version": "0.7.2",
        "inputs": {
            "files": ["code/foo.C", "code/bar.C"],
            "directories": ["workflow/yadage"],
            "parameters": {"foo": "foo_val", "bar": "bar_val", "baz": "baz_val"},
        },
        "outputs": {"files": ["fitdata/plot.png"]},
        "workflow": {
            "type": "yadage",
            "file": "workflow/yadage/workflow.yaml",
            "specification": {
                "stages": [
                    {
                        "name": "gendata",
                        "dependencies": {
                            "dependency_type": "jsonpath_ready",
                            "expressions": ["init"],
                        },
                        "scheduler": {
                            "scheduler_type": "singlestep-stage",
                            "parameters": [
                                {"key": "foo", "value": stage_output("init", "foo")},
                                {"key": "bar", "value": stage_output("init", "bar")},
                            ],
                            "step": {
                                "process": {
                                    "process_type": "interpolated-script-cmd",
                                    "script": "python --foo '{foo}/{bar}'",
                                    "interpreter": "sh",
                                },
                                "publisher": {
                                    "publisher_type": "frompar-pub",
                                    "outputmap": {"data": "outfilename"},
                                },
                                "environment": root6_environment(),
                            },
                        },
                    },
                    {
                        "name": "fitdata",
                        "dependencies": {
                            "dependency_type": "jsonpath_ready",
                            "expressions": ["gendata"],
                        },
                        "scheduler": {
                            "scheduler_type": "singlestep-stage",
                            "parameters": [
                                {"key": "baz", "value": stage_output("init", "baz")},
                                {"key": "bar", "value": stage_output("gendata", "bar")},
                            ],
                            "step": {
                                "process": {
                                    "process_type": "interpolated-script-cmd",
                                    "script": "root -b -q '(\"{baz}\",\"{bar}\")'",
                                    "interpreter": "sh",
                                },
                                "publisher": {
                                    "publisher_type": "frompar-pub",
                                    "outputmap": {"plot": "outfile"},
                                },
                                "environment": root6_environment(),
                            },
                        },
                    },
                    {
                        "name": "parent_step",
                        "dependencies": {
                            "dependency_type": "jsonpath_ready",
                            "expressions": [""],
                        },
                        "scheduler": {
                            "scheduler_type": "singlestep-stage",
                            "parameters": [
                                {"key": "nested_foo", "value": stage_output("init", "nested_foo")},
                            ],
                            "workflow": {
                                "stages": [
                                    {
                                        "name": "nested_step",
                                        "dependencies": {
                                            "dependency_type": "jsonpath_ready",
                                            "expressions": ["run_mc"],
                                        },
                                        "scheduler": {
                                            "scheduler_type": "singlestep-stage",
                                            "parameters": [
                                                {
                                                    "key": "nested_foo",
                                                    "value": {"step": "init", "output": "nested_foo"},
                                                },
                                                {
                                                    "key": "inputs",
                                                    "value": {
                                                        "stages": "run_mc[*].mergeallvars",
                                                        "output": "mergedfile",
                                                        "expression_type": "stage-output-selector",
                                                    },
                                                },
                                                {"key": "mergedfile", "value": "{workdir}/merged.root"},
                                            ],
                                            "step": {
                                                "process": {
                                                    "process_type": "interpolated-script-cmd",
                                                    "interpreter": "bash",
                                                    "script": "source /usr/local/bin/{nested_foo}.sh\nhadd {mergedfile} {inputs}\n",
                                                },
                                                "environment": root6_environment(),
                                                "publisher": {
                                                    "publisher_type": "frompar-pub",
                                                    "outputmap": {"mergedfile": "mergedfile"},
                                                },
                                            },
                                        },
                                    }
                                ]
                            },
                        },
                    },
                ]
            },
        },
    })
}

fn snakemake_step(name: &str, command: &str) -> Value {
    json!({
        "commands": [command],
        "environment": "python:2.7-slim",
        "inputs": {},
        "kubernetes_memory_limit": null,
        "kubernetes_uid": null,
        "name": name,
        "outputs": {},
        "params": {},
    })
}

/// Scatter-gather snakemake specification as loaded from `reana.yaml`.
pub fn snakemake_workflow_spec_loaded() -> Value {
    json!({
        "version": "0.8.0",
        "workflow": {
            "type": "snakemake",
            "file": "workflow/snakemake/Snakemake",
            "specification": {
                "job_dependencies": {
                    "all": ["gather"],
                    "gather": ["scatterA", "scatterB"],
                    "scatterA": [],
                    "scatterB": [],
                },
                "steps": [
                    snakemake_step("scatterA", "sleep 15 && mkdir -p results && touch {output}"),
                    snakemake_step("scatterB", "sleep 30 && mkdir -p results && touch {output}"),
                    snakemake_step("gather", "sleep 5 && touch {output}"),
                ],
            },
        },
    })
}

/// Scheduling condition that always lets queued workflows start.
pub fn sample_condition_for_starting_queued_workflows() -> bool {
    true
}

/// Scheduling condition that never requeues workflows.
pub fn sample_condition_for_requeueing_workflows() -> bool {
    false
}
