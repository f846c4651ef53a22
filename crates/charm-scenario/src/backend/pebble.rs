// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pebble API over the containers in the State.

use serde_json::json;

use super::{PebbleClient, SimulatedBackend};
use crate::error::{ModelError, ModelResult};
use crate::state::{
    CheckInfo, CheckLevel, CheckStatus, Container, ExecOutput, FileInfo, FsError, Layer,
    LabeledLayer, Plan, ServiceInfo, ServiceStatus, Startup,
};

fn fs_error(container: &str, err: FsError) -> ModelError {
    match err {
        FsError::NotFound(path) => ModelError::PathNotFound {
            container: container.to_string(),
            path,
        },
        FsError::Invalid { path, message } => ModelError::Path {
            container: container.to_string(),
            path,
            message,
        },
    }
}

fn api_error(container: &str, message: impl Into<String>) -> ModelError {
    ModelError::PebbleApi {
        container: container.to_string(),
        message: message.into(),
    }
}

impl SimulatedBackend {
    /// A container Pebble can be reached in.
    fn workload(&mut self, name: &str) -> ModelResult<&mut Container> {
        let container = self
            .state
            .container_mut(name)
            .ok_or_else(|| ModelError::ContainerNotFound(name.to_string()))?;
        if !container.can_connect {
            return Err(ModelError::Connection(name.to_string()));
        }
        Ok(container)
    }

    fn set_service_status(
        &mut self,
        container: &str,
        names: &[&str],
        status: ServiceStatus,
    ) -> ModelResult<()> {
        let workload = self.workload(container)?;
        if names.is_empty() {
            return Err(api_error(container, "no services specified"));
        }
        let plan = workload.plan().map_err(|e| api_error(container, e))?;
        if let Some(missing) = names.iter().find(|n| !plan.services.contains_key(**n)) {
            return Err(api_error(
                container,
                format!("service \"{missing}\" does not exist"),
            ));
        }
        for name in names {
            workload.service_statuses.insert(name.to_string(), status);
        }
        Ok(())
    }

    fn set_check_status(
        &mut self,
        container: &str,
        names: &[&str],
        active: bool,
    ) -> ModelResult<Vec<String>> {
        let workload = self.workload(container)?;
        let plan = workload.plan().map_err(|e| api_error(container, e))?;
        if let Some(missing) = names.iter().find(|n| !plan.checks.contains_key(**n)) {
            return Err(api_error(
                container,
                format!("check \"{missing}\" does not exist"),
            ));
        }
        let mut changed = Vec::new();
        for name in names {
            let info = workload
                .check_infos
                .entry(name.to_string())
                .or_insert_with(|| CheckInfo::new(*name));
            let inactive = info.status == CheckStatus::Inactive;
            if active && inactive {
                info.status = CheckStatus::Up;
                info.failures = 0;
                changed.push(name.to_string());
            } else if !active && !inactive {
                info.status = CheckStatus::Inactive;
                changed.push(name.to_string());
            }
        }
        Ok(changed)
    }
}

impl PebbleClient for SimulatedBackend {
    fn can_connect(&mut self, container: &str) -> bool {
        self.traced("pebble-can-connect", json!({ "container": container }), |b| {
            Ok(b.state
                .container(container)
                .is_some_and(|c| c.can_connect))
        })
        .unwrap_or(false)
    }

    fn get_plan(&mut self, container: &str) -> ModelResult<Plan> {
        self.traced("pebble-get-plan", json!({ "container": container }), |b| {
            b.workload(container)?
                .plan()
                .map_err(|e| api_error(container, e))
        })
    }

    fn add_layer(
        &mut self,
        container: &str,
        label: &str,
        layer: &Layer,
        combine: bool,
    ) -> ModelResult<()> {
        let args = json!({
            "container": container,
            "label": label,
            "layer": layer,
            "combine": combine,
        });
        self.traced("pebble-add-layer", args, |b| {
            let workload = b.workload(container)?;
            let mut layers = workload.layers.clone();
            match layers.iter_mut().find(|l| l.label == label) {
                Some(existing) if combine => existing
                    .layer
                    .combine(layer)
                    .map_err(|e| api_error(container, e))?,
                Some(_) => {
                    return Err(api_error(
                        container,
                        format!("layer \"{label}\" already exists"),
                    ));
                }
                None => layers.push(LabeledLayer {
                    label: label.to_string(),
                    layer: layer.clone(),
                }),
            }
            Plan::from_layers(&layers).map_err(|e| api_error(container, e))?;
            workload.layers = layers;
            Ok(())
        })
    }

    fn replan(&mut self, container: &str) -> ModelResult<()> {
        self.traced("pebble-replan", json!({ "container": container }), |b| {
            let workload = b.workload(container)?;
            let plan = workload.plan().map_err(|e| api_error(container, e))?;
            for (name, service) in &plan.services {
                if service.startup == Some(Startup::Enabled) {
                    workload
                        .service_statuses
                        .insert(name.clone(), ServiceStatus::Active);
                }
            }
            Ok(())
        })
    }

    fn get_services(&mut self, container: &str, names: &[&str]) -> ModelResult<Vec<ServiceInfo>> {
        let args = json!({ "container": container, "names": names });
        self.traced("pebble-get-services", args, |b| {
            let workload = b.workload(container)?;
            let plan = workload.plan().map_err(|e| api_error(container, e))?;
            Ok(plan
                .services
                .iter()
                .filter(|(name, _)| names.is_empty() || names.contains(&name.as_str()))
                .map(|(name, service)| ServiceInfo {
                    name: name.clone(),
                    startup: service.startup.unwrap_or_default(),
                    current: workload.service_status(name),
                })
                .collect())
        })
    }

    fn start_services(&mut self, container: &str, names: &[&str]) -> ModelResult<()> {
        let args = json!({ "container": container, "names": names });
        self.traced("pebble-start", args, |b| {
            b.set_service_status(container, names, ServiceStatus::Active)
        })
    }

    fn stop_services(&mut self, container: &str, names: &[&str]) -> ModelResult<()> {
        let args = json!({ "container": container, "names": names });
        self.traced("pebble-stop", args, |b| {
            b.set_service_status(container, names, ServiceStatus::Inactive)
        })
    }

    fn restart_services(&mut self, container: &str, names: &[&str]) -> ModelResult<()> {
        let args = json!({ "container": container, "names": names });
        self.traced("pebble-restart", args, |b| {
            b.set_service_status(container, names, ServiceStatus::Active)
        })
    }

    fn push(
        &mut self,
        container: &str,
        path: &str,
        data: &[u8],
        make_dirs: bool,
    ) -> ModelResult<()> {
        let args = json!({
            "container": container,
            "path": path,
            "bytes": data.len(),
            "make_dirs": make_dirs,
        });
        self.traced("pebble-push", args, |b| {
            b.workload(container)?
                .push(path, data, make_dirs)
                .map_err(|e| fs_error(container, e))
        })
    }

    fn pull(&mut self, container: &str, path: &str) -> ModelResult<Vec<u8>> {
        let args = json!({ "container": container, "path": path });
        self.traced_with(
            "pebble-pull",
            args,
            |b| {
                b.workload(container)?
                    .pull(path)
                    .map_err(|e| fs_error(container, e))
            },
            |data| json!({ "bytes": data.len() }),
        )
    }

    fn list_files(&mut self, container: &str, path: &str) -> ModelResult<Vec<FileInfo>> {
        let args = json!({ "container": container, "path": path });
        self.traced("pebble-list-files", args, |b| {
            b.workload(container)?
                .list_files(path)
                .map_err(|e| fs_error(container, e))
        })
    }

    fn make_dir(&mut self, container: &str, path: &str, make_parents: bool) -> ModelResult<()> {
        let args = json!({ "container": container, "path": path, "make_parents": make_parents });
        self.traced("pebble-make-dir", args, |b| {
            b.workload(container)?
                .make_dir(path, make_parents)
                .map_err(|e| fs_error(container, e))
        })
    }

    fn remove_path(&mut self, container: &str, path: &str, recursive: bool) -> ModelResult<()> {
        let args = json!({ "container": container, "path": path, "recursive": recursive });
        self.traced("pebble-remove-path", args, |b| {
            b.workload(container)?
                .remove_path(path, recursive)
                .map_err(|e| fs_error(container, e))
        })
    }

    fn exec(&mut self, container: &str, command: &[&str]) -> ModelResult<ExecOutput> {
        let args = json!({ "container": container, "command": command });
        self.traced("pebble-exec", args, |b| {
            let command: Vec<String> = command.iter().map(|s| s.to_string()).collect();
            let workload = b.workload(container)?;
            let output = workload
                .find_exec_mock(&command)
                .map(|mock| mock.output.clone())
                .ok_or_else(|| ModelError::ExecNotMocked {
                    container: container.to_string(),
                    command: command.clone(),
                })?;
            if output.return_code != 0 {
                return Err(ModelError::ExecFailed {
                    command,
                    exit_code: output.return_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                });
            }
            Ok(output)
        })
    }

    fn get_checks(
        &mut self,
        container: &str,
        level: Option<CheckLevel>,
        names: &[&str],
    ) -> ModelResult<Vec<CheckInfo>> {
        let args = json!({ "container": container, "level": level, "names": names });
        self.traced("pebble-get-checks", args, |b| {
            let workload = b.workload(container)?;
            let plan = workload.plan().map_err(|e| api_error(container, e))?;
            Ok(plan
                .checks
                .iter()
                .filter(|(name, _)| names.is_empty() || names.contains(&name.as_str()))
                .map(|(name, check)| {
                    let mut info = workload
                        .check_infos
                        .get(name)
                        .cloned()
                        .unwrap_or_else(|| CheckInfo::new(name.clone()));
                    if info.level.is_none() {
                        info.level = check.level;
                    }
                    if let Some(threshold) = check.threshold {
                        info.threshold = threshold;
                    }
                    info
                })
                .filter(|info| level.is_none() || info.level == level)
                .collect())
        })
    }

    fn start_checks(&mut self, container: &str, names: &[&str]) -> ModelResult<Vec<String>> {
        let args = json!({ "container": container, "names": names });
        self.traced("pebble-start-checks", args, |b| {
            b.set_check_status(container, names, true)
        })
    }

    fn stop_checks(&mut self, container: &str, names: &[&str]) -> ModelResult<Vec<String>> {
        let args = json!({ "container": container, "names": names });
        self.traced("pebble-stop-checks", args, |b| {
            b.set_check_status(container, names, false)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::JujuVersion;
    use crate::event::Event;
    use crate::meta::{CharmMeta, ContainerMeta};
    use crate::state::{Check, Mount, Service, State};

    fn backend(container: Container) -> SimulatedBackend {
        let meta = Arc::new(CharmMeta::new("web").with_container("workload", ContainerMeta::default()));
        SimulatedBackend::new(
            State::new().with_container(container),
            meta,
            JujuVersion::new(3, 4, 0),
            &Event::start(),
        )
    }

    fn layer() -> Layer {
        Layer::new()
            .with_service("server", Service::new("/bin/server").with_startup(Startup::Enabled))
            .with_service("worker", Service::new("/bin/worker"))
    }

    #[test]
    fn test_disconnected_container_refuses() {
        let mut b = backend(Container::new("workload"));
        assert!(!b.can_connect("workload"));
        assert!(matches!(
            b.get_plan("workload"),
            Err(ModelError::Connection(_))
        ));
        assert!(matches!(
            b.get_plan("sidecar"),
            Err(ModelError::ContainerNotFound(_))
        ));
    }

    #[test]
    fn test_layers_and_services() {
        let mut b = backend(Container::new("workload").with_can_connect(true));
        b.add_layer("workload", "base", &layer(), false).unwrap();
        assert!(matches!(
            b.add_layer("workload", "base", &layer(), false),
            Err(ModelError::PebbleApi { .. })
        ));
        assert_eq!(b.get_plan("workload").unwrap().services.len(), 2);

        b.replan("workload").unwrap();
        let services = b.get_services("workload", &[]).unwrap();
        assert!(services.iter().find(|s| s.name == "server").unwrap().is_running());
        assert!(!services.iter().find(|s| s.name == "worker").unwrap().is_running());

        b.start_services("workload", &["worker"]).unwrap();
        assert!(b.get_services("workload", &["worker"]).unwrap()[0].is_running());
        b.stop_services("workload", &["worker"]).unwrap();
        assert!(!b.get_services("workload", &["worker"]).unwrap()[0].is_running());

        assert!(matches!(
            b.start_services("workload", &["ghost"]),
            Err(ModelError::PebbleApi { .. })
        ));
    }

    #[test]
    fn test_filesystem_errors_map() {
        let container = Container::new("workload")
            .with_can_connect(true)
            .with_mount("config", Mount::new("/etc/app").with_file("/etc/app/app.conf", "x=1"));
        let mut b = backend(container);

        assert_eq!(b.pull("workload", "/etc/app/app.conf").unwrap(), b"x=1");
        assert_eq!(
            b.trace().calls_named("pebble-pull").next().map(|c| c.outcome.clone()),
            Some(crate::trace::CallOutcome::Ok { value: json!({ "bytes": 3 }) })
        );
        assert_eq!(
            b.pull("workload", "/etc/app/missing").unwrap_err().code(),
            "PathNotFoundError"
        );
        assert_eq!(b.pull("workload", "/etc/app").unwrap_err().code(), "PathError");

        b.push("workload", "/etc/app/sub/new.conf", b"y", true).unwrap();
        let names: Vec<String> = b
            .list_files("workload", "/etc/app")
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["sub", "app.conf"]);
    }

    #[test]
    fn test_exec_mocks() {
        let container = Container::new("workload")
            .with_can_connect(true)
            .with_exec_mock(["app", "--version"], ExecOutput::ok("1.2.3\n"))
            .with_exec_mock(["app", "migrate"], ExecOutput::failed(2, "locked"));
        let mut b = backend(container);

        assert_eq!(b.exec("workload", &["app", "--version"]).unwrap().stdout, "1.2.3\n");
        assert!(matches!(
            b.exec("workload", &["app", "migrate", "--all"]),
            Err(ModelError::ExecFailed { exit_code: 2, .. })
        ));
        assert!(matches!(
            b.exec("workload", &["ls"]),
            Err(ModelError::ExecNotMocked { .. })
        ));
    }

    #[test]
    fn test_checks() {
        let check = Check {
            level: Some(CheckLevel::Alive),
            threshold: Some(5),
            http: Some("http://localhost/health".to_string()),
            ..Check::default()
        };
        let container = Container::new("workload")
            .with_can_connect(true)
            .with_layer("base", Layer::new().with_check("http", check));
        let mut b = backend(container);

        let checks = b.get_checks("workload", None, &[]).unwrap();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].threshold, 5);
        assert!(b.get_checks("workload", Some(CheckLevel::Ready), &[]).unwrap().is_empty());

        assert_eq!(b.stop_checks("workload", &["http"]).unwrap(), vec!["http"]);
        assert!(b.stop_checks("workload", &["http"]).unwrap().is_empty());
        assert_eq!(b.start_checks("workload", &["http"]).unwrap(), vec!["http"]);
    }
}
