//! The per-tick loop: inject, advance, reconcile, exchange, apply.
//!
//! One tick always runs to completion before the next one starts. The only
//! await points are the transport's send and receive; a shutdown signal at any
//! of them ends the loop, after which the simulation and the socket are closed.

use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::communication::messages::CommandBatch;
use crate::communication::transport::BridgeTransport;
use crate::config::BridgeConfig;
use crate::control_system::command_interpreter::{apply_commands, CommandReport};
use crate::control_system::platoon_colors::PlatoonColorManager;
use crate::error::{AdapterError, BridgeError, ConfigError};
use crate::global_variables::STATUS_LOG_INTERVAL;
use crate::simulation_engine::adapter::{Rgba, SimulationAdapter, VehicleSpawn};
use crate::simulation_engine::snapshot::build_snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    Idle,
    Injecting,
    Advancing,
    Reconciling,
    Exchanging,
    Applying,
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickSummary {
    pub tick: u64,
    pub injected: Option<String>,
    pub arrived: Vec<String>,
    pub snapshot_size: usize,
    /// `None` when the controller sent no commands.
    pub report: Option<CommandReport>,
}

/// Totals over a whole session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub injected: usize,
    pub arrived: usize,
    pub commands_applied: usize,
}

/// Produces `veh_<unix_seconds>_<n>` ids with a process-wide counter, so two
/// injections can never share an id.
#[derive(Debug, Default)]
pub struct VehicleIdGenerator {
    next: u64,
}

impl VehicleIdGenerator {
    pub fn next_id(&mut self, unix_seconds: u64) -> String {
        let id = format!("veh_{}_{}", unix_seconds, self.next);
        self.next += 1;
        id
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

pub struct TickDriver<A, S> {
    adapter: A,
    transport: BridgeTransport<S>,
    colors: PlatoonColorManager,
    config: BridgeConfig,
    ids: VehicleIdGenerator,
    rng: StdRng,
    phase: TickPhase,
    tick: u64,
    totals: RunSummary,
}

impl<A, S> TickDriver<A, S>
where
    A: SimulationAdapter,
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Fails if `config` does not pass [`BridgeConfig::validate`].
    pub fn new(
        adapter: A,
        transport: BridgeTransport<S>,
        config: BridgeConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            adapter,
            transport,
            colors: PlatoonColorManager::new(),
            config,
            ids: VehicleIdGenerator::default(),
            rng: StdRng::from_rng(&mut rand::rng()),
            phase: TickPhase::Idle,
            tick: 0,
            totals: RunSummary::default(),
        })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn colors(&self) -> &PlatoonColorManager {
        &self.colors
    }

    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    fn enter(&mut self, phase: TickPhase) {
        self.phase = phase;
    }

    /// Register the injected vehicle type. A failure only disables injection
    /// of that type; the bridge keeps running.
    pub fn prepare(&mut self) {
        let type_id = self.config.injection.vehicle_type_id.clone();
        match self
            .adapter
            .register_vehicle_type(&type_id, &self.config.vehicle_type)
        {
            Ok(()) => info!("vehicle type '{type_id}' created successfully"),
            Err(err) => warn!("error initializing vehicle types: {err}"),
        }
        match self.adapter.route_ids() {
            Ok(routes) => info!("available routes: {routes:?}"),
            Err(err) => warn!("error getting routes: {err}"),
        }
    }

    /// Maybe create one vehicle on a random route. Returns its id if created.
    fn maybe_inject(&mut self) -> Result<Option<String>, AdapterError> {
        let injection = &self.config.injection;
        let live = match self.adapter.live_vehicle_ids() {
            Ok(ids) => ids.len(),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!("skipping injection, cannot count live vehicles: {err}");
                return Ok(None);
            }
        };
        if live >= injection.max_vehicles {
            return Ok(None);
        }
        if !self.rng.random_bool(injection.probability) {
            return Ok(None);
        }

        let routes = match self.adapter.route_ids() {
            Ok(routes) => routes,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!("error getting routes: {err}");
                return Ok(None);
            }
        };
        let Some(route_id) = routes.choose(&mut self.rng) else {
            warn!("no routes available in simulation!");
            return Ok(None);
        };

        let spawn = VehicleSpawn {
            id: self.ids.next_id(unix_seconds()),
            route_id: route_id.clone(),
            type_id: injection.vehicle_type_id.clone(),
            depart_lane: 0,
            depart_pos: 0.0,
            depart_speed: 0.0,
        };
        let max_speed = self
            .rng
            .random_range(injection.min_max_speed..injection.max_max_speed);

        match self.adapter.create_vehicle(&spawn) {
            Ok(()) => {}
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!("failed to add vehicle: {err}");
                return Ok(None);
            }
        }
        for result in [
            self.adapter.set_max_speed(&spawn.id, max_speed),
            self.adapter.set_color(&spawn.id, Rgba::WHITE),
        ] {
            match result {
                Ok(()) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => warn!("vehicle {} added with default settings: {err}", spawn.id),
            }
        }

        info!("added vehicle {} on route {}", spawn.id, spawn.route_id);
        Ok(Some(spawn.id))
    }

    /// Run one full tick.
    pub async fn run_tick(&mut self) -> Result<TickSummary, BridgeError> {
        self.tick += 1;

        self.enter(TickPhase::Injecting);
        let injected = self.maybe_inject()?;

        self.enter(TickPhase::Advancing);
        match self.adapter.step() {
            Ok(()) => {}
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => warn!("simulation step {} failed: {err}", self.tick),
        }

        self.enter(TickPhase::Reconciling);
        let arrived = match self.adapter.arrived_vehicle_ids() {
            Ok(arrived) => arrived,
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                warn!("error getting arrived vehicles: {err}");
                Vec::new()
            }
        };
        if !arrived.is_empty() {
            info!("vehicles completed routes: {}", arrived.join(", "));
        }

        self.enter(TickPhase::Exchanging);
        let snapshot = build_snapshot(&self.adapter)?;
        self.transport.send(&snapshot).await?;
        let batch = match self.transport.receive::<Option<CommandBatch>>().await? {
            Some(batch) => batch,
            None => {
                warn!("controller closed the stream; no commands for tick {}", self.tick);
                None
            }
        };

        self.enter(TickPhase::Applying);
        let report = match batch {
            Some(batch) => {
                let report = apply_commands(&batch, &mut self.adapter, &mut self.colors)?;
                log_report(&report);
                Some(report)
            }
            None => None,
        };

        if self.tick % STATUS_LOG_INTERVAL == 0 {
            match self.adapter.live_vehicle_ids() {
                Ok(ids) => info!("simulation step {}, {} vehicles active", self.tick, ids.len()),
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => warn!("simulation step {}, vehicle count unavailable: {err}", self.tick),
            }
        }
        self.enter(TickPhase::Idle);

        self.totals.ticks = self.tick;
        self.totals.injected += usize::from(injected.is_some());
        self.totals.arrived += arrived.len();
        self.totals.commands_applied += usize::from(report.is_some());

        Ok(TickSummary {
            tick: self.tick,
            injected,
            arrived,
            snapshot_size: snapshot.len(),
            report,
        })
    }

    /// Tick until `shutdown` resolves, `max_ticks` is reached or a fatal error
    /// occurs. The simulation and the transport are closed on every exit path.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<RunSummary, BridgeError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.prepare();
        let delay = self.config.tick_delay();

        let outcome = loop {
            if self.config.max_ticks.is_some_and(|max| self.tick >= max) {
                break Ok(());
            }
            tokio::select! {
                biased;
                _ = &mut shutdown => break Ok(()),
                result = self.run_tick() => {
                    if let Err(err) = result {
                        break Err(err);
                    }
                }
            }
            tokio::select! {
                biased;
                _ = &mut shutdown => break Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        };

        let interrupted_in = self.phase;
        self.close().await;

        match outcome {
            Ok(()) => {
                if interrupted_in != TickPhase::Idle {
                    info!("stopped during {interrupted_in:?} phase of tick {}", self.tick);
                }
                info!("stopping simulation after {} ticks", self.tick);
                Ok(self.totals.clone())
            }
            Err(err) => {
                error!("bridge session failed: {err}");
                Err(err)
            }
        }
    }

    /// Release the simulation connection and the controller socket.
    pub async fn close(&mut self) {
        if let Err(err) = self.adapter.close() {
            warn!("error closing simulation: {err}");
        }
        if let Err(err) = self.transport.shutdown().await {
            debug!("error shutting down controller socket: {err}");
        }
        self.enter(TickPhase::Idle);
    }
}

fn log_report(report: &CommandReport) {
    for failure in &report.failures {
        warn!("command for {} failed: {}", failure.vehicle_id, failure.error);
    }
    if let Some(stats) = &report.stats {
        info!("{stats}");
    }
    debug!("applied commands: {report}");
}
