use crate::model::configuration::Configuration;
use crate::model::interval::ProcSet;
use crate::model::job::Job;
use crate::model::resource::ResourceIdMap;
use crate::platform::{PlatformConfig, PlatformTrait, ResourceSet};
use crate::scheduler::hierarchy::Hierarchy;
use indexmap::IndexMap;
use log::LevelFilter;
use std::rc::Rc;

/// In mocking, the time unit is the minute.
pub struct PlatformMock {
    platform_config: Rc<PlatformConfig>,
    now: i64,
    max_time: i64,
    scheduled_jobs: Vec<Job>,
    waiting_jobs: IndexMap<i64, Job>,
}

impl PlatformMock {
    pub fn new(platform_config: PlatformConfig, scheduled_jobs: Vec<Job>, waiting_jobs: Vec<Job>) -> Self {
        PlatformMock {
            platform_config: Rc::new(platform_config),
            now: 0,
            max_time: 1_000_000,
            scheduled_jobs,
            waiting_jobs: waiting_jobs.into_iter().map(|j| (j.id, j)).collect(),
        }
    }
    pub fn with_now(mut self, now: i64) -> Self {
        self.now = now;
        self
    }
    pub fn scheduled_job(&self, id: i64) -> Option<&Job> {
        self.scheduled_jobs.iter().find(|j| j.id == id)
    }
    pub fn waiting_job_ids(&self) -> Vec<i64> {
        self.waiting_jobs.keys().copied().collect()
    }
}

impl PlatformTrait for PlatformMock {
    fn get_now(&self) -> i64 {
        self.now
    }
    fn get_max_time(&self) -> i64 {
        self.max_time
    }
    fn get_platform_config(&self) -> &Rc<PlatformConfig> {
        &self.platform_config
    }
    fn get_scheduled_jobs(&self) -> &[Job] {
        &self.scheduled_jobs
    }
    fn get_waiting_jobs(&self, queues: &[String]) -> IndexMap<i64, Job> {
        self.waiting_jobs
            .iter()
            .filter(|(_id, job)| queues.iter().any(|q| q.as_str() == job.queue.as_ref()))
            .map(|(id, job)| (*id, job.clone()))
            .collect()
    }
    fn save_assignments(&mut self, assigned_jobs: IndexMap<i64, Job>) {
        // Move assigned jobs from waiting map to scheduled vec
        self.waiting_jobs.retain(|id, _job| !assigned_jobs.contains_key(id));
        self.scheduled_jobs.extend(assigned_jobs.into_values());
    }
}

pub fn init_test_logger() {
    env_logger::Builder::new().is_test(true).filter(None, LevelFilter::Debug).try_init().ok();
}

pub fn generate_mock_platform_config(cache_enabled: bool, res_count: u32, switch_size: u32, node_size: u32, cpu_size: u32) -> PlatformConfig {
    let config = Configuration {
        cache_enabled,
        scheduler_job_security_time: 0,
        ..Configuration::default()
    };
    PlatformConfig {
        resource_set: generate_mock_resource_set(res_count, switch_size, node_size, cpu_size),
        config,
    }
}

/// Consecutive blocks of `block_size` ids in `1..=res_count`.
fn blocks(res_count: u32, block_size: u32) -> Box<[ProcSet]> {
    (1..=res_count)
        .step_by(block_size as usize)
        .map(|first| ProcSet::from_iter([first..=(first + block_size - 1).min(res_count)]))
        .collect()
}

/// Generates a mock resource set with a hierarchy of switches, nodes, cpus and cores as the unit.
/// `switch_size` is expressed in number of nodes, `node_size` in number of CPUs, and `cpu_size` in number of cores.
/// Resource ids go from 1 to `res_count` and are their own external id.
pub fn generate_mock_resource_set(res_count: u32, switch_size: u32, node_size: u32, cpu_size: u32) -> ResourceSet {
    let hierarchy = Hierarchy::new()
        .add_partition("switches".into(), blocks(res_count, switch_size * node_size * cpu_size))
        .add_partition("nodes".into(), blocks(res_count, node_size * cpu_size))
        .add_partition("cpus".into(), blocks(res_count, cpu_size))
        .add_unit_partition("cores".into());

    ResourceSet {
        nb_resources_not_dead: res_count,
        nb_resources_default_not_dead: res_count,
        suspendable_resources: ProcSet::new(),
        default_resources: ProcSet::from_iter([1..=res_count]),
        available_upto: vec![], // All resources available until max_time
        hierarchy,
        id_map: ResourceIdMap::new((0..=res_count as i64).collect()).unwrap(),
    }
}
