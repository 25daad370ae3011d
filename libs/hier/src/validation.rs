//! Hierarchy validation.
//!
//! Connection lists appended with `check = false` during staged generation
//! are only reconciled here. A module with outstanding [`Severity::Error`]
//! issues must not be handed to the timing models.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};
use tracing::{span, Level};

use crate::{Library, ModuleId};

/// An enumeration of possible severity levels.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    /// An informational message.
    Info,
    /// A warning.
    #[default]
    Warning,
    /// An error. Often, but not always, fatal.
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A collection of validation issues.
#[derive(Debug, Clone, Default)]
pub struct IssueSet {
    issues: Vec<ValidatorIssue>,
    num_errors: usize,
    num_warnings: usize,
}

impl IssueSet {
    /// Creates a new, empty issue set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the given issue to the set.
    pub fn add(&mut self, issue: ValidatorIssue) {
        match issue.severity {
            Severity::Error => self.num_errors += 1,
            Severity::Warning => self.num_warnings += 1,
            Severity::Info => (),
        }
        self.issues.push(issue);
    }

    /// Returns an iterator over all issues in the set.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &ValidatorIssue> {
        self.issues.iter()
    }

    /// The number of issues in this set.
    #[inline]
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Returns `true` if this set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Returns `true` if this set contains an error.
    #[inline]
    pub fn has_error(&self) -> bool {
        self.num_errors > 0
    }

    /// The number of errors in this set.
    #[inline]
    pub fn num_errors(&self) -> usize {
        self.num_errors
    }

    /// The number of warnings in this set.
    #[inline]
    pub fn num_warnings(&self) -> usize {
        self.num_warnings
    }
}

impl Display for IssueSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for issue in self.issues.iter() {
            writeln!(f, "{}", issue)?;
        }
        Ok(())
    }
}

/// An issue identified during validation of a library.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatorIssue {
    cause: Cause,
    severity: Severity,
}

/// The underlying cause of a [`ValidatorIssue`].
#[derive(Clone, Debug, PartialEq)]
pub enum Cause {
    /// A connection list does not match its instance's pin count.
    ConnectionArity {
        /// The parent module.
        module: ArcStr,
        /// The offending instance.
        instance: ArcStr,
        /// The child module's pin count.
        expected: usize,
        /// The number of connected nets.
        actual: usize,
    },
    /// Instances and connection lists are out of step.
    InstanceCount {
        /// The parent module.
        module: ArcStr,
        /// The number of instances.
        instances: usize,
        /// The number of connection lists.
        connections: usize,
    },
    /// Two instances in one module share a name.
    DuplicateInstanceNames {
        /// The parent module.
        module: ArcStr,
        /// The duplicated name.
        instance: ArcStr,
    },
    /// An instance references a module missing from the library.
    MissingChildModule {
        /// The parent module.
        module: ArcStr,
        /// The offending instance.
        instance: ArcStr,
    },
    /// A net of the module is not connected to anything.
    FloatingPin {
        /// The module.
        module: ArcStr,
        /// The floating pin.
        pin: ArcStr,
    },
}

impl ValidatorIssue {
    /// Creates a new validator issue from the given cause and severity.
    pub(crate) fn new(cause: Cause, severity: Severity) -> Self {
        Self { cause, severity }
    }

    /// Gets the underlying cause of this issue.
    #[inline]
    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    /// The severity of this issue.
    #[inline]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Creates a new validator issue and logs it immediately.
    ///
    /// The log level will be selected according to the given severity.
    pub(crate) fn new_and_log(cause: Cause, severity: Severity) -> Self {
        let result = Self::new(cause, severity);
        match severity {
            Severity::Info => tracing::event!(Level::INFO, issue = ?result.cause, "{}", result),
            Severity::Warning => tracing::event!(Level::WARN, issue = ?result.cause, "{}", result),
            Severity::Error => tracing::event!(Level::ERROR, issue = ?result.cause, "{}", result),
        }
        result
    }
}

impl Display for ValidatorIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.severity, self.cause)
    }
}

impl Display for Cause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionArity {
                module,
                instance,
                expected,
                actual,
            } => write!(
                f,
                "instance `{instance}` in module `{module}` has {expected} pins but {actual} connected nets"
            ),
            Self::InstanceCount {
                module,
                instances,
                connections,
            } => write!(
                f,
                "module `{module}` has {instances} instances but {connections} connection lists"
            ),
            Self::DuplicateInstanceNames { module, instance } => write!(
                f,
                "duplicate instance names: found two or more instances named `{instance}` in module `{module}`"
            ),
            Self::MissingChildModule { module, instance } => write!(
                f,
                "instance `{instance}` in module `{module}` references a module missing from the library"
            ),
            Self::FloatingPin { module, pin } => write!(
                f,
                "pin `{pin}` of module `{module}` is not connected to any instance or device"
            ),
        }
    }
}

impl Library {
    /// Checks every module in the library.
    pub fn validate(&self) -> IssueSet {
        let _guard = span!(Level::INFO, "validating library", lib = %self.name()).entered();
        let mut issues = IssueSet::new();
        for (id, _) in self.modules() {
            self.validate_module_inner(id, &mut issues);
        }
        issues
    }

    /// Checks a single module.
    pub fn validate_module(&self, id: ModuleId) -> IssueSet {
        let mut issues = IssueSet::new();
        self.validate_module_inner(id, &mut issues);
        issues
    }

    fn validate_module_inner(&self, id: ModuleId, issues: &mut IssueSet) {
        let module = self.module(id);
        let _guard = span!(Level::DEBUG, "validating module", module = %module.name).entered();

        if module.instances.len() != module.connections.len() {
            issues.add(ValidatorIssue::new_and_log(
                Cause::InstanceCount {
                    module: module.name.clone(),
                    instances: module.instances.len(),
                    connections: module.connections.len(),
                },
                Severity::Error,
            ));
        }

        let mut names = HashSet::new();
        for (inst, conns) in module.instances.iter().zip(module.connections.iter()) {
            if !names.insert(inst.name().clone()) {
                issues.add(ValidatorIssue::new_and_log(
                    Cause::DuplicateInstanceNames {
                        module: module.name.clone(),
                        instance: inst.name().clone(),
                    },
                    Severity::Error,
                ));
            }
            let Some(child) = self.try_module(inst.module()) else {
                issues.add(ValidatorIssue::new_and_log(
                    Cause::MissingChildModule {
                        module: module.name.clone(),
                        instance: inst.name().clone(),
                    },
                    Severity::Error,
                ));
                continue;
            };
            if child.pins.len() != conns.len() {
                issues.add(ValidatorIssue::new_and_log(
                    Cause::ConnectionArity {
                        module: module.name.clone(),
                        instance: inst.name().clone(),
                        expected: child.pins.len(),
                        actual: conns.len(),
                    },
                    Severity::Error,
                ));
            }
        }

        if module.is_composite() || !module.devices.is_empty() {
            for pin in module.pins.iter() {
                let used_by_instance = module.net_users(pin).next().is_some();
                let used_by_device = module.devices.iter().any(|d| {
                    [&d.d, &d.g, &d.s, &d.b]
                        .iter()
                        .any(|n| n.eq_ignore_ascii_case(pin))
                });
                if !used_by_instance && !used_by_device {
                    issues.add(ValidatorIssue::new_and_log(
                        Cause::FloatingPin {
                            module: module.name.clone(),
                            pin: pin.clone(),
                        },
                        Severity::Warning,
                    ));
                }
            }
        }
    }
}
