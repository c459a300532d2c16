// crates/bmc_sim/tests/cycle.rs

//! 模拟单元每步循环的端到端测试：粒子守恒、分裂增长、出口
//! 排空与确定性重放。

use bmc_cma::snapshot::NeighborTable;
use bmc_cma::state::PreCalculatedHydroState;
use bmc_cma::transitioner::IterationState;
use bmc_mc::container::ParticlesContainer;
use bmc_mc::domain::ReactorDomain;
use bmc_mc::events::EventType;
use bmc_mc::model::{PilotCell, Status};
use bmc_mc::prng::RngPool;
use bmc_sim::{ExitFlow, SimulationUnit};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// 三隔室全连通回路，体积 1 m³，隔室间流量 0.1 m³/s
fn three_compartment_hydro() -> PreCalculatedHydroState {
    let flows = vec![
        0.0, 0.1, 0.1, //
        0.1, 0.0, 0.1, //
        0.1, 0.1, 0.0,
    ];
    let volumes = vec![1.0, 1.0, 1.0];
    let neighbors = NeighborTable::new(3, 2, vec![1, 2, 0, 2, 0, 1]).unwrap();
    PreCalculatedHydroState::compute_liquid(&flows, &volumes, &neighbors).unwrap()
}

/// 单隔室封闭反应器
fn single_compartment_hydro() -> PreCalculatedHydroState {
    let neighbors = NeighborTable::single_compartment();
    PreCalculatedHydroState::compute_liquid(&[0.0], &[1.0], &neighbors).unwrap()
}

fn make_unit(
    n_particle: usize,
    n_compartment: usize,
    seed: u64,
    exit_flows: Vec<ExitFlow>,
) -> SimulationUnit<PilotCell> {
    let pool = RngPool::new(seed, 0);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let container = ParticlesContainer::<PilotCell>::new(n_particle, 1.0, &mut rng);
    let domain = ReactorDomain::new(n_compartment).unwrap();
    let mut unit = SimulationUnit::new(container, domain, pool, exit_flows);
    let spread: Vec<usize> = (0..n_compartment).collect();
    unit.scatter_particles(&spread).unwrap();
    unit
}

#[test]
fn test_particles_conserved_without_exits() {
    let hydro = three_compartment_hydro();
    let state = IterationState {
        liquid: &hydro,
        gas: None,
        neighbors: &hydro.neighbors,
        energy_dissipation: 0.0,
    };

    // 无底物则无生长无分裂，种群规模必须守恒
    let mut unit = make_unit(300, 3, 42, Vec::new());
    for step in 0..50 {
        unit.cycle(step, 1.0, &state).unwrap();
        assert_eq!(unit.container().n_particles(), 300);
        assert_eq!(unit.domain().total_cells(), 300);
    }

    assert!(unit.events().get(EventType::Move) > 0);
    assert_eq!(unit.events().get(EventType::Death), 0);
    assert_eq!(unit.events().get(EventType::Exit), 0);
    assert_eq!(unit.events().get(EventType::Overflow), 0);
    assert!(unit.counts_consistent());
}

#[test]
fn test_migration_reaches_all_compartments() {
    let hydro = three_compartment_hydro();
    let state = IterationState {
        liquid: &hydro,
        gas: None,
        neighbors: &hydro.neighbors,
        energy_dissipation: 0.0,
    };

    // 初始全部集中在隔室 0
    let mut unit = make_unit(300, 3, 7, Vec::new());
    unit.scatter_particles(&[0]).unwrap();
    assert_eq!(unit.domain().distribution(), vec![300, 0, 0]);

    for step in 0..100 {
        unit.cycle(step, 1.0, &state).unwrap();
    }

    // 对称回路的稳态分布应覆盖全部隔室
    let dist = unit.domain().distribution();
    assert!(dist.iter().all(|&c| c > 0), "分布 {dist:?} 存在空隔室");
    assert_eq!(dist.iter().sum::<u64>(), 300);
}

#[test]
fn test_division_grows_population() {
    let hydro = single_compartment_hydro();
    let state = IterationState {
        liquid: &hydro,
        gas: None,
        neighbors: &hydro.neighbors,
        energy_dissipation: 0.0,
    };

    let mut unit = make_unit(10, 1, 3, Vec::new());
    // 充足底物：Monod 速率接近上限
    unit.set_concentration(0, 0, 1.0e6);

    for step in 0..120 {
        unit.cycle(step, 60.0, &state).unwrap();
    }

    let n = unit.container().n_particles() as u64;
    assert!(n > 10, "种群未增长: {n}");
    assert_eq!(unit.events().get(EventType::NewParticle), n - 10);
    assert_eq!(unit.events().get(EventType::Death), 0);
    assert_eq!(unit.domain().total_cells(), n);
}

#[test]
fn test_exit_flow_drains_population() {
    let hydro = single_compartment_hydro();
    let state = IterationState {
        liquid: &hydro,
        gas: None,
        neighbors: &hydro.neighbors,
        energy_dissipation: 0.0,
    };

    let exits = vec![ExitFlow {
        compartment: 0,
        flow: 5.0,
    }];
    let mut unit = make_unit(100, 1, 11, exits);

    for step in 0..10 {
        unit.cycle(step, 1.0, &state).unwrap();
    }

    let alive = unit.domain().total_cells();
    let exited = unit.events().get(EventType::Exit);
    assert!(exited > 0);
    assert_eq!(alive + exited, 100);

    // 收尾压实后主表只剩存活行
    unit.finalize().unwrap();
    assert_eq!(unit.container().n_particles() as u64, alive);
    for i in 0..unit.container().n_particles() {
        assert_eq!(unit.container().status(i), Status::Idle);
    }
}

#[test]
fn test_contribution_pipeline_updates_concentration() {
    let hydro = single_compartment_hydro();
    let state = IterationState {
        liquid: &hydro,
        gas: None,
        neighbors: &hydro.neighbors,
        energy_dissipation: 0.0,
    };

    let mut unit = make_unit(200, 1, 21, Vec::new());
    unit.set_concentration(0, 0, 10.0);

    for step in 0..5 {
        unit.cycle(step, 60.0, &state).unwrap();
        let contrib = unit.take_contributions();
        // 细胞吸收底物，贡献为负
        assert!(contrib[0] < 0.0, "底物贡献非负: {}", contrib[0]);
        unit.apply_contributions(60.0, &hydro.inverse_volume, &contrib)
            .unwrap();
    }

    let substrate = unit.concentrations()[0];
    assert!(substrate < 10.0, "底物未被消耗: {substrate}");
    assert!(substrate >= 0.0);

    // 取走即清零，重复应用不再改变浓度场
    let drained = unit.take_contributions();
    assert!(drained.iter().all(|&v| v == 0.0));

    // 主端广播的全局场覆盖本地场
    unit.set_concentrations(&[3.5, 0.2]).unwrap();
    assert_eq!(unit.concentrations(), &[3.5, 0.2]);
    assert!(unit.set_concentrations(&[1.0]).is_err());
}

#[test]
fn test_replay_is_deterministic() {
    let hydro = three_compartment_hydro();

    let run = || {
        let state = IterationState {
            liquid: &hydro,
            gas: None,
            neighbors: &hydro.neighbors,
            energy_dissipation: 0.0,
        };
        let mut unit = make_unit(300, 3, 1234, Vec::new());
        for step in 0..30 {
            unit.cycle(step, 1.0, &state).unwrap();
        }
        let positions: Vec<usize> = (0..unit.container().n_particles())
            .map(|i| unit.container().position(i))
            .collect();
        (positions, unit.domain().distribution())
    };

    // 同种子两次运行逐粒子一致，与线程调度无关
    let (pos_a, dist_a) = run();
    let (pos_b, dist_b) = run();
    assert_eq!(pos_a, pos_b);
    assert_eq!(dist_a, dist_b);
}
