//! Concurrent evaluation of mini tournaments.
//!
//! The coordinator is an actor: a dispatcher thread owns all tournament
//! state and reacts to messages (new tournament, finished run, shutdown).
//! Runs are executed by a fixed pool of worker threads that pull jobs from a
//! shared queue. Callers only ever see a [`TournamentHandle`] they can block
//! on.
//!
//! Guarantees:
//! - at most one run per (genome, instance) pair is in flight, no matter how
//!   many tournaments want it; all of them receive its result
//! - jobs are handed out only to idle workers, in order of the evaluator's
//!   priority, so the queue never holds stale work
//! - results already in storage are never recomputed
//! - a failed run fails every tournament waiting for it

use super::genome_stats::{GenomeStats, InstanceState};
use super::run_evaluator::RunEvaluator;
use super::storage::ResultStorage;
use super::target_algorithm::{CancellationToken, TargetAlgorithmFactory};
use crate::engines::generation::genome::Genome;
use crate::error::{Result, TunerError};
use crate::types::{Instance, RunResult};
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub worker_count: usize,
    /// Maximum number of target algorithm runs over the coordinator's
    /// lifetime. Cached results do not count.
    pub evaluation_limit: Option<usize>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            evaluation_limit: None,
        }
    }
}

/// A set of genomes competing on a set of instances
#[derive(Debug, Clone, PartialEq)]
pub struct MiniTournament {
    pub id: usize,
    pub participants: Vec<Genome>,
    pub instances: Vec<Instance>,
    pub number_of_winners: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MiniTournamentResult {
    pub tournament_id: usize,
    /// Distinct participants, best first
    pub ranking: Vec<Genome>,
    pub winners: Vec<Genome>,
    pub results: HashMap<Genome, Vec<(Instance, RunResult)>>,
    pub cancelled_by_racing: Vec<Genome>,
    /// Participants with runs skipped because the evaluation limit was hit
    pub cancelled_by_budget: Vec<Genome>,
}

impl MiniTournamentResult {
    pub fn results_of(&self, genome: &Genome) -> &[(Instance, RunResult)] {
        self.results.get(genome).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Pending tournament result, resolved by the dispatcher
pub struct TournamentHandle {
    tournament_id: usize,
    receiver: Receiver<Result<MiniTournamentResult>>,
}

impl TournamentHandle {
    pub fn tournament_id(&self) -> usize {
        self.tournament_id
    }

    /// Blocks until the tournament is decided
    pub fn wait(self) -> Result<MiniTournamentResult> {
        self.receiver.recv().map_err(|_| {
            TunerError::CoordinatorUnavailable(format!(
                "dispatcher stopped before tournament {} finished",
                self.tournament_id
            ))
        })?
    }
}

enum Message {
    Submit(MiniTournament, Sender<Result<MiniTournamentResult>>),
    RunFinished {
        genome: Genome,
        instance: Instance,
        outcome: RunOutcome,
    },
    Shutdown,
}

enum RunOutcome {
    Completed(RunResult),
    Cancelled,
    Failed(String),
}

struct Job {
    genome: Genome,
    instance: Instance,
    token: CancellationToken,
}

pub struct EvaluationCoordinator {
    sender: Sender<Message>,
    dispatcher: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    storage: Arc<dyn ResultStorage>,
    evaluator: Arc<dyn RunEvaluator>,
    evaluations_started: Arc<AtomicUsize>,
    budget_exhausted: Arc<AtomicBool>,
    config: CoordinatorConfig,
}

impl EvaluationCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        factory: Arc<dyn TargetAlgorithmFactory>,
        storage: Arc<dyn ResultStorage>,
        evaluator: Arc<dyn RunEvaluator>,
    ) -> Result<Self> {
        if config.worker_count == 0 {
            return Err(TunerError::Configuration(
                "Evaluation coordinator needs at least one worker".to_string(),
            ));
        }

        let (sender, receiver) = channel::<Message>();
        let (job_sender, job_receiver) = channel::<Job>();
        let job_receiver = Arc::new(Mutex::new(job_receiver));

        let mut workers = Vec::with_capacity(config.worker_count);
        for index in 0..config.worker_count {
            let jobs = Arc::clone(&job_receiver);
            let results = sender.clone();
            let factory = Arc::clone(&factory);
            let handle = thread::Builder::new()
                .name(format!("evaluation-worker-{}", index))
                .spawn(move || worker_loop(jobs, results, factory))?;
            workers.push(handle);
        }

        let evaluations_started = Arc::new(AtomicUsize::new(0));
        let budget_exhausted = Arc::new(AtomicBool::new(false));
        let dispatcher = Dispatcher {
            evaluation_limit: config.evaluation_limit,
            storage: Arc::clone(&storage),
            evaluator: Arc::clone(&evaluator),
            jobs: job_sender,
            idle_workers: config.worker_count,
            tournaments: BTreeMap::new(),
            in_flight: HashMap::new(),
            next_key: 0,
            evaluations_started: Arc::clone(&evaluations_started),
            budget_exhausted: Arc::clone(&budget_exhausted),
        };
        let dispatcher = thread::Builder::new()
            .name("evaluation-dispatcher".to_string())
            .spawn(move || dispatcher.run(receiver))?;

        info!(
            "Evaluation coordinator started with {} workers",
            config.worker_count
        );

        Ok(Self {
            sender,
            dispatcher: Some(dispatcher),
            workers,
            storage,
            evaluator,
            evaluations_started,
            budget_exhausted,
            config,
        })
    }

    pub fn submit(&self, tournament: MiniTournament) -> Result<TournamentHandle> {
        let (reply, receiver) = channel();
        let tournament_id = tournament.id;
        self.sender
            .send(Message::Submit(tournament, reply))
            .map_err(|_| {
                TunerError::CoordinatorUnavailable("dispatcher is not running".to_string())
            })?;
        Ok(TournamentHandle {
            tournament_id,
            receiver,
        })
    }

    pub fn evaluate(&self, tournament: MiniTournament) -> Result<MiniTournamentResult> {
        self.submit(tournament)?.wait()
    }

    pub fn storage(&self) -> &Arc<dyn ResultStorage> {
        &self.storage
    }

    pub fn evaluator(&self) -> &Arc<dyn RunEvaluator> {
        &self.evaluator
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn evaluations_started(&self) -> usize {
        self.evaluations_started.load(Ordering::SeqCst)
    }

    pub fn is_budget_exhausted(&self) -> bool {
        self.budget_exhausted.load(Ordering::SeqCst)
    }
}

impl Drop for EvaluationCoordinator {
    fn drop(&mut self) {
        let _ = self.sender.send(Message::Shutdown);
        if let Some(dispatcher) = self.dispatcher.take() {
            if dispatcher.join().is_err() {
                warn!("Evaluation dispatcher panicked");
            }
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("Evaluation worker panicked");
            }
        }
    }
}

fn worker_loop(
    jobs: Arc<Mutex<Receiver<Job>>>,
    results: Sender<Message>,
    factory: Arc<dyn TargetAlgorithmFactory>,
) {
    loop {
        let job = match jobs.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => break,
        };
        let Ok(job) = job else { break };

        let outcome = if job.token.is_cancelled() {
            RunOutcome::Cancelled
        } else {
            match factory
                .configure(&job.genome)
                .and_then(|mut algorithm| algorithm.run(&job.instance, &job.token))
            {
                _ if job.token.is_cancelled() => RunOutcome::Cancelled,
                Ok(result) => RunOutcome::Completed(result),
                Err(e) => RunOutcome::Failed(e.to_string()),
            }
        };

        let finished = Message::RunFinished {
            genome: job.genome,
            instance: job.instance,
            outcome,
        };
        if results.send(finished).is_err() {
            break;
        }
    }
}

struct ActiveTournament {
    tournament: MiniTournament,
    stats: Vec<GenomeStats>,
    reply: Sender<Result<MiniTournamentResult>>,
    cancelled_by_racing: HashSet<Genome>,
    cancelled_by_budget: HashSet<Genome>,
}

struct InFlightRun {
    token: CancellationToken,
    interested: HashSet<usize>,
}

type RunKey = (Genome, Instance);

struct Dispatcher {
    evaluation_limit: Option<usize>,
    storage: Arc<dyn ResultStorage>,
    evaluator: Arc<dyn RunEvaluator>,
    jobs: Sender<Job>,
    idle_workers: usize,
    tournaments: BTreeMap<usize, ActiveTournament>,
    in_flight: HashMap<RunKey, InFlightRun>,
    next_key: usize,
    evaluations_started: Arc<AtomicUsize>,
    budget_exhausted: Arc<AtomicBool>,
}

impl Dispatcher {
    fn run(mut self, messages: Receiver<Message>) {
        while let Ok(message) = messages.recv() {
            match message {
                Message::Submit(tournament, reply) => self.accept(tournament, reply),
                Message::RunFinished {
                    genome,
                    instance,
                    outcome,
                } => self.on_run_finished(genome, instance, outcome),
                Message::Shutdown => break,
            }
            self.dispatch();
            self.complete_decided_tournaments();
        }

        for run in self.in_flight.values() {
            run.token.cancel();
        }
        for (_, active) in std::mem::take(&mut self.tournaments) {
            let _ = active.reply.send(Err(TunerError::CoordinatorUnavailable(format!(
                "coordinator shut down during tournament {}",
                active.tournament.id
            ))));
        }
        debug!("Evaluation dispatcher stopped");
    }

    fn accept(&mut self, tournament: MiniTournament, reply: Sender<Result<MiniTournamentResult>>) {
        if tournament.participants.is_empty() || tournament.instances.is_empty() {
            let _ = reply.send(Err(TunerError::InvalidArgument(format!(
                "tournament {} needs participants and instances",
                tournament.id
            ))));
            return;
        }

        let key = self.next_key;
        self.next_key += 1;

        let mut seen = HashSet::new();
        let mut stats = Vec::with_capacity(tournament.participants.len());
        for genome in &tournament.participants {
            if !seen.insert(genome.clone()) {
                continue;
            }
            let mut genome_stats = GenomeStats::new(genome.clone(), &tournament.instances);
            for instance in &tournament.instances {
                if let Some(result) = self.storage.query(genome, instance) {
                    let _ = genome_stats.finish(instance, result);
                } else if let Some(run) = self.in_flight.get_mut(&(genome.clone(), instance.clone())) {
                    run.interested.insert(key);
                    let _ = genome_stats.start(instance);
                }
            }
            stats.push(genome_stats);
        }

        debug!(
            "Accepted tournament {} with {} genomes on {} instances",
            tournament.id,
            stats.len(),
            tournament.instances.len()
        );

        self.tournaments.insert(
            key,
            ActiveTournament {
                tournament,
                stats,
                reply,
                cancelled_by_racing: HashSet::new(),
                cancelled_by_budget: HashSet::new(),
            },
        );
        self.race(key);
    }

    fn on_run_finished(&mut self, genome: Genome, instance: Instance, outcome: RunOutcome) {
        self.idle_workers += 1;
        let run_key = (genome, instance);
        let interested = match self.in_flight.remove(&run_key) {
            Some(run) => run.interested,
            None => HashSet::new(),
        };
        let (genome, instance) = run_key;

        match outcome {
            RunOutcome::Completed(result) => {
                self.storage.store(&genome, &instance, result.clone());
                for key in &interested {
                    if let Some(active) = self.tournaments.get_mut(key) {
                        if let Some(stats) = active.stats.iter_mut().find(|s| *s.genome() == genome) {
                            let _ = stats.finish(&instance, result.clone());
                        }
                    }
                }
                for key in interested {
                    self.race(key);
                }
            }
            RunOutcome::Cancelled => {
                // Tournaments that joined after the run was cancelled still need it.
                for key in interested {
                    if let Some(active) = self.tournaments.get_mut(&key) {
                        if let Some(stats) = active.stats.iter_mut().find(|s| *s.genome() == genome) {
                            stats.reopen(&instance);
                        }
                    }
                }
            }
            RunOutcome::Failed(message) => {
                warn!("Run of {} on {} failed: {}", genome, instance, message);
                for key in interested {
                    self.fail(
                        key,
                        TunerError::Evaluation(format!(
                            "run of {} on {} failed: {}",
                            genome, instance, message
                        )),
                    );
                }
            }
        }
    }

    /// Cancels every participant of tournament `key` that can no longer win
    fn race(&mut self, key: usize) {
        let Some(active) = self.tournaments.get_mut(&key) else {
            return;
        };
        let number_of_winners = active.tournament.number_of_winners.min(active.stats.len());
        let cancellable = match self
            .evaluator
            .genomes_that_can_be_cancelled_by_racing(&active.stats, number_of_winners)
        {
            Ok(cancellable) => cancellable,
            Err(e) => {
                self.fail(key, e);
                return;
            }
        };

        let mut released = Vec::new();
        for genome in cancellable {
            if !active.cancelled_by_racing.insert(genome.clone()) {
                continue;
            }
            if let Some(stats) = active.stats.iter_mut().find(|s| *s.genome() == genome) {
                for instance in stats.cancel_unfinished() {
                    released.push((genome.clone(), instance));
                }
            }
            debug!(
                "Racing cancelled {} in tournament {}",
                genome, active.tournament.id
            );
        }
        for run_key in released {
            self.release(key, run_key);
        }
    }

    /// Drops the interest of tournament `key` in a running evaluation and
    /// cancels it once nobody waits for it anymore.
    fn release(&mut self, key: usize, run_key: RunKey) {
        if let Some(run) = self.in_flight.get_mut(&run_key) {
            run.interested.remove(&key);
            if run.interested.is_empty() {
                run.token.cancel();
            }
        }
    }

    fn fail(&mut self, key: usize, error: TunerError) {
        let Some(mut active) = self.tournaments.remove(&key) else {
            return;
        };
        let mut released = Vec::new();
        for stats in active.stats.iter_mut() {
            let genome = stats.genome().clone();
            for instance in stats.cancel_unfinished() {
                released.push((genome.clone(), instance));
            }
        }
        for run_key in released {
            self.release(key, run_key);
        }
        warn!("Tournament {} failed: {}", active.tournament.id, error);
        let _ = active.reply.send(Err(error));
    }

    /// Hands open runs to idle workers, lowest priority value first
    fn dispatch(&mut self) {
        while self.idle_workers > 0 {
            let Some(run_key) = self.next_open_run() else {
                return;
            };

            if let Some(result) = self.storage.query(&run_key.0, &run_key.1) {
                self.finish_everywhere(&run_key, result);
                continue;
            }

            if let Some(run) = self.in_flight.get_mut(&run_key) {
                // Wait for the running evaluation instead of starting a second one.
                for (key, active) in self.tournaments.iter_mut() {
                    if let Some(stats) = active.stats.iter_mut().find(|s| *s.genome() == run_key.0) {
                        if stats.state(&run_key.1) == Some(&InstanceState::Open) {
                            let _ = stats.start(&run_key.1);
                            run.interested.insert(*key);
                        }
                    }
                }
                continue;
            }

            if let Some(limit) = self.evaluation_limit {
                if self.evaluations_started.load(Ordering::SeqCst) >= limit {
                    self.exhaust_budget();
                    return;
                }
            }

            let token = CancellationToken::new();
            let mut interested = HashSet::new();
            for (key, active) in self.tournaments.iter_mut() {
                if let Some(stats) = active.stats.iter_mut().find(|s| *s.genome() == run_key.0) {
                    if stats.state(&run_key.1) == Some(&InstanceState::Open) {
                        let _ = stats.start(&run_key.1);
                        interested.insert(*key);
                    }
                }
            }

            let job = Job {
                genome: run_key.0.clone(),
                instance: run_key.1.clone(),
                token: token.clone(),
            };
            if self.jobs.send(job).is_err() {
                warn!("No evaluation worker is alive");
                return;
            }
            self.idle_workers -= 1;
            self.evaluations_started.fetch_add(1, Ordering::SeqCst);
            self.in_flight.insert(run_key, InFlightRun { token, interested });
        }
    }

    fn next_open_run(&self) -> Option<RunKey> {
        let mut best: Option<(f64, RunKey)> = None;
        for active in self.tournaments.values() {
            for stats in &active.stats {
                let Some(instance) = stats.open_instances().next() else {
                    continue;
                };
                let priority = self.evaluator.compute_evaluation_priority_of_genome(stats);
                let better = match &best {
                    Some((current, _)) => priority < *current,
                    None => true,
                };
                if better {
                    best = Some((priority, (stats.genome().clone(), instance.clone())));
                }
            }
        }
        best.map(|(_, run_key)| run_key)
    }

    fn finish_everywhere(&mut self, run_key: &RunKey, result: RunResult) {
        let mut touched = Vec::new();
        for (key, active) in self.tournaments.iter_mut() {
            if let Some(stats) = active.stats.iter_mut().find(|s| *s.genome() == run_key.0) {
                if stats.state(&run_key.1) == Some(&InstanceState::Open) {
                    let _ = stats.finish(&run_key.1, result.clone());
                    touched.push(*key);
                }
            }
        }
        for key in touched {
            self.race(key);
        }
    }

    fn exhaust_budget(&mut self) {
        if !self.budget_exhausted.swap(true, Ordering::SeqCst) {
            info!("Evaluation limit reached, remaining runs are skipped");
        }
        for active in self.tournaments.values_mut() {
            for stats in active.stats.iter_mut() {
                let open: Vec<Instance> = stats.open_instances().cloned().collect();
                if open.is_empty() {
                    continue;
                }
                for instance in &open {
                    stats.cancel(instance);
                }
                active.cancelled_by_budget.insert(stats.genome().clone());
            }
        }
    }

    fn complete_decided_tournaments(&mut self) {
        let decided: Vec<usize> = self
            .tournaments
            .iter()
            .filter(|(_, active)| active.stats.iter().all(GenomeStats::is_done))
            .map(|(key, _)| *key)
            .collect();

        for key in decided {
            let Some(active) = self.tournaments.remove(&key) else {
                continue;
            };
            let result = self.summarize(active.tournament.id, &active);
            debug!(
                "Tournament {} decided, winners: {}",
                result.tournament_id,
                result
                    .winners
                    .iter()
                    .map(|g| g.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            let _ = active.reply.send(Ok(result));
        }
    }

    fn summarize(&self, tournament_id: usize, active: &ActiveTournament) -> MiniTournamentResult {
        let mut sorted = active.stats.clone();
        self.evaluator.sort(&mut sorted);

        let ranking: Vec<Genome> = sorted.iter().map(|s| s.genome().clone()).collect();
        let number_of_winners = active.tournament.number_of_winners.min(ranking.len());
        let winners = ranking[..number_of_winners].to_vec();
        let results = sorted
            .iter()
            .map(|s| {
                let finished = s
                    .finished_results()
                    .map(|(i, r)| (i.clone(), r.clone()))
                    .collect();
                (s.genome().clone(), finished)
            })
            .collect();

        // Keep the ranking order in the reported cancellations.
        let cancelled_by_racing = ranking
            .iter()
            .filter(|g| active.cancelled_by_racing.contains(*g))
            .cloned()
            .collect();
        let cancelled_by_budget = ranking
            .iter()
            .filter(|g| active.cancelled_by_budget.contains(*g))
            .cloned()
            .collect();

        MiniTournamentResult {
            tournament_id,
            ranking,
            winners,
            results,
            cancelled_by_racing,
            cancelled_by_budget,
        }
    }
}
