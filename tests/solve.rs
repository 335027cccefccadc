use bitprop::prelude::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn solver_with_seed(seed: u64) -> Solver {
    init_logging();
    let mut s = Solver::new();
    s.set_option(OptionKey::Seed, seed).unwrap();
    // bound every search so a broken engine fails fast instead of hanging
    s.set_option(OptionKey::PropNprops, 100_000).unwrap();
    s
}

fn bv(width: u32, value: u64) -> BitVector {
    BitVector::from_u64(width, value)
}

#[test]
fn trivial_sat_boolean_literals() {
    let mut s = solver_with_seed(1);
    let f = s.formula_mut();
    let b = f.sort_bool();
    let x = f.mk_var(b, Some("x")).unwrap();
    let y = f.mk_var(b, Some("y")).unwrap();
    let root = f.mk_and(x, y.not()).unwrap();
    s.assert_formula(root).unwrap();

    assert_eq!(s.check_sat(), Answer::Sat);
    assert!(s.get_value(x).unwrap().is_true());
    assert!(s.get_value(y).unwrap().is_false());
}

#[test]
fn constant_propagation_through_addition() {
    let mut s = solver_with_seed(2);
    let f = s.formula_mut();
    let s4 = f.sort_bitvec(4).unwrap();
    let x = f.mk_var(s4, Some("x")).unwrap();
    let nine = f.mk_const(bv(4, 0b1001));
    let three = f.mk_const(bv(4, 0b0011));
    let sum = f.mk_add(x, nine).unwrap();
    let root = f.mk_eq(sum, three).unwrap();
    s.assert_formula(root).unwrap();

    assert_eq!(s.check_sat(), Answer::Sat);
    assert_eq!(s.get_value(x).unwrap(), bv(4, 0b1010));
}

#[test]
fn contradiction_is_unsat_without_the_engine() {
    let mut s = solver_with_seed(3);
    let f = s.formula_mut();
    let s1 = f.sort_bitvec(1).unwrap();
    let x = f.mk_var(s1, Some("x")).unwrap();
    let refl = f.mk_eq(x, x).unwrap();
    let contra = f.mk_eq(x, x.not()).unwrap();
    s.assert_formula(refl).unwrap();
    s.assert_formula(contra).unwrap();

    assert_eq!(s.check_sat(), Answer::Unsat);
    // the engine never ran
    assert_eq!(s.stats().moves, 0);
}

#[test]
fn odd_multiplier_inverts_uniquely() {
    let mut s = solver_with_seed(4);
    let f = s.formula_mut();
    let s8 = f.sort_bitvec(8).unwrap();
    let x = f.mk_var(s8, Some("x")).unwrap();
    let three = f.mk_const(bv(8, 3));
    let c21 = f.mk_const(bv(8, 21));
    let prod = f.mk_mul(x, three).unwrap();
    let root = f.mk_eq(prod, c21).unwrap();
    s.assert_formula(root).unwrap();

    assert_eq!(s.check_sat(), Answer::Sat);
    // unique because 3 is odd
    assert_eq!(s.get_value(x).unwrap(), bv(8, 7));
}

#[test]
fn even_multiplier_frees_the_high_bits() {
    for seed in 1..=8 {
        let mut s = solver_with_seed(seed);
        let f = s.formula_mut();
        let s8 = f.sort_bitvec(8).unwrap();
        let x = f.mk_var(s8, Some("x")).unwrap();
        let four = f.mk_const(bv(8, 4));
        let c12 = f.mk_const(bv(8, 12));
        let prod = f.mk_mul(x, four).unwrap();
        let root = f.mk_eq(prod, c12).unwrap();
        s.assert_formula(root).unwrap();

        assert_eq!(s.check_sat(), Answer::Sat, "seed {seed}");
        let got = s.get_value(x).unwrap().to_u64();
        assert!(
            [3, 67, 131, 195].contains(&got),
            "seed {seed}: 4 * {got} != 12 mod 256"
        );
    }
}

#[test]
fn div_rem_identity_holds() {
    let mut s = solver_with_seed(5);
    let f = s.formula_mut();
    let s8 = f.sort_bitvec(8).unwrap();
    let x = f.mk_var(s8, Some("x")).unwrap();
    let y = f.mk_var(s8, Some("y")).unwrap();
    let q = f.mk_udiv(x, y).unwrap();
    let back = f.mk_mul(q, y).unwrap();
    let r = f.mk_urem(x, y).unwrap();
    let sum = f.mk_add(back, r).unwrap();
    let root = f.mk_eq(sum, x).unwrap();
    s.assert_formula(root).unwrap();

    // a tautology under the division conventions, including y = 0
    assert_eq!(s.check_sat(), Answer::Sat);
    let xv = s.get_value(x).unwrap();
    let yv = s.get_value(y).unwrap();
    assert_eq!(xv.udiv(&yv).mul(&yv).add(&xv.urem(&yv)), xv);
}

#[test]
fn width_one_bitvectors_act_as_booleans() {
    let mut s = solver_with_seed(6);
    let f = s.formula_mut();
    let s1 = f.sort_bitvec(1).unwrap();
    let x = f.mk_var(s1, Some("x")).unwrap();
    let one = f.mk_const(bv(1, 1));
    let root = f.mk_eq(x, one).unwrap();
    s.assert_formula(root).unwrap();

    assert_eq!(s.check_sat(), Answer::Sat);
    assert!(s.get_value(x).unwrap().is_true());
}

#[test]
fn shifts_propagate_through_both_operands() {
    let mut s = solver_with_seed(7);
    let f = s.formula_mut();
    let s8 = f.sort_bitvec(8).unwrap();
    let s3 = f.sort_bitvec(3).unwrap();
    let x = f.mk_var(s8, Some("x")).unwrap();
    let d = f.mk_var(s3, Some("d")).unwrap();
    let c = f.mk_const(bv(8, 0b0001_0000));
    let shifted = f.mk_shl(x, d).unwrap();
    let root = f.mk_eq(shifted, c).unwrap();
    s.assert_formula(root).unwrap();

    assert_eq!(s.check_sat(), Answer::Sat);
    let xv = s.get_value(x).unwrap();
    let dv = s.get_value(d).unwrap();
    assert_eq!(xv.shl(&dv), bv(8, 0b0001_0000));
}

#[test]
fn conditionals_flip_or_follow_the_branch() {
    let mut s = solver_with_seed(8);
    let f = s.formula_mut();
    let b = f.sort_bool();
    let s8 = f.sort_bitvec(8).unwrap();
    let c = f.mk_var(b, Some("c")).unwrap();
    let x = f.mk_var(s8, Some("x")).unwrap();
    let five = f.mk_const(bv(8, 5));
    let seven = f.mk_const(bv(8, 7));
    let ite = f.mk_cond(c, x, seven).unwrap();
    let root = f.mk_eq(ite, five).unwrap();
    s.assert_formula(root).unwrap();

    // only the then-branch can reach 5, so c must flip to true
    assert_eq!(s.check_sat(), Answer::Sat);
    assert!(s.get_value(c).unwrap().is_true());
    assert_eq!(s.get_value(x).unwrap(), bv(8, 5));
}

#[test]
fn unsatisfiable_masks_exhaust_the_budget() {
    let mut s = solver_with_seed(9);
    s.set_option(OptionKey::PropNprops, 2_000).unwrap();
    let f = s.formula_mut();
    let s8 = f.sort_bitvec(8).unwrap();
    let x = f.mk_var(s8, Some("x")).unwrap();
    let mask = f.mk_const(bv(8, 0b1100));
    let c = f.mk_const(bv(8, 0b0011));
    let masked = f.mk_and(x, mask).unwrap();
    let root = f.mk_eq(masked, c).unwrap();
    s.assert_formula(root).unwrap();

    // x & 0b1100 can never equal 0b0011: the engine is incomplete and
    // must give up on its budget, counting the constant conflicts
    assert_eq!(s.check_sat(), Answer::Unknown);
    assert!(s.stats().non_rec_conflicts > 0);
}

#[test]
fn scenarios_converge_within_the_move_bound() {
    // the bounded-moves property over distinct seeds
    for seed in 1..=10u64 {
        let mut s = solver_with_seed(seed);
        let f = s.formula_mut();
        let s8 = f.sort_bitvec(8).unwrap();
        let x = f.mk_var(s8, Some("x")).unwrap();
        let y = f.mk_var(s8, Some("y")).unwrap();
        let three = f.mk_const(bv(8, 3));
        let c21 = f.mk_const(bv(8, 21));
        let prod = f.mk_mul(x, three).unwrap();
        let r1 = f.mk_eq(prod, c21).unwrap();
        let r2 = f.mk_ult(y, x).unwrap();
        s.assert_formula(r1).unwrap();
        s.assert_formula(r2).unwrap();

        assert_eq!(s.check_sat(), Answer::Sat, "seed {seed}");
        assert!(
            s.stats().moves <= 100,
            "seed {seed} took {} moves",
            s.stats().moves
        );
        let xv = s.get_value(x).unwrap();
        assert_eq!(xv, bv(8, 7), "seed {seed}");
        assert!(s.get_value(y).unwrap().ult(&xv), "seed {seed}");
    }
}

#[test]
fn random_path_selection_still_converges() {
    let mut s = solver_with_seed(11);
    s.set_option(OptionKey::PropPathSel, 1).unwrap();
    let f = s.formula_mut();
    let s8 = f.sort_bitvec(8).unwrap();
    let x = f.mk_var(s8, Some("x")).unwrap();
    let nine = f.mk_const(bv(8, 9));
    let c3 = f.mk_const(bv(8, 3));
    let sum = f.mk_add(x, nine).unwrap();
    let root = f.mk_eq(sum, c3).unwrap();
    s.assert_formula(root).unwrap();

    assert_eq!(s.check_sat(), Answer::Sat);
    assert_eq!(s.get_value(x).unwrap(), bv(8, 250));
}

#[test]
fn substitution_closes_chained_equalities() {
    let mut s = solver_with_seed(12);
    let f = s.formula_mut();
    let s8 = f.sort_bitvec(8).unwrap();
    let x = f.mk_var(s8, Some("x")).unwrap();
    let y = f.mk_var(s8, Some("y")).unwrap();
    let five = f.mk_const(bv(8, 5));
    let bind = f.mk_eq(x, five).unwrap();
    let sum = f.mk_add(x, y).unwrap();
    let ten = f.mk_const(bv(8, 10));
    let root = f.mk_eq(sum, ten).unwrap();
    s.assert_formula(bind).unwrap();
    s.assert_formula(root).unwrap();

    assert_eq!(s.check_sat(), Answer::Sat);
    assert_eq!(s.get_value(x).unwrap(), bv(8, 5));
    assert_eq!(s.get_value(y).unwrap(), bv(8, 5));
}

#[test]
fn model_is_consistent_after_sat() {
    let mut s = solver_with_seed(13);
    let f = s.formula_mut();
    let s8 = f.sort_bitvec(8).unwrap();
    let x = f.mk_var(s8, Some("x")).unwrap();
    let y = f.mk_var(s8, Some("y")).unwrap();
    let sum = f.mk_add(x, y).unwrap();
    let c = f.mk_const(bv(8, 100));
    let root = f.mk_ult(c, sum).unwrap();
    s.assert_formula(root).unwrap();

    assert_eq!(s.check_sat(), Answer::Sat);
    // stored values equal bottom-up re-evaluation
    let (xv, yv) = (s.get_value(x).unwrap(), s.get_value(y).unwrap());
    assert_eq!(s.get_value(sum).unwrap(), xv.add(&yv));
    assert!(s.get_value(root).unwrap().is_true());
}

#[test]
fn termination_hook_cancels_mid_search() {
    let mut s = solver_with_seed(14);
    s.set_option(OptionKey::PropNprops, 0).unwrap();
    let f = s.formula_mut();
    let s8 = f.sort_bitvec(8).unwrap();
    let x = f.mk_var(s8, Some("x")).unwrap();
    let mask = f.mk_const(bv(8, 0b1100));
    let c = f.mk_const(bv(8, 0b0011));
    let masked = f.mk_and(x, mask).unwrap();
    let root = f.mk_eq(masked, c).unwrap();
    s.assert_formula(root).unwrap();

    // unsatisfiable and unbounded: only the hook stops the search
    let mut polls = 0u32;
    s.set_termination(move || {
        polls += 1;
        polls > 500
    });
    assert_eq!(s.check_sat(), Answer::Unknown);
}
