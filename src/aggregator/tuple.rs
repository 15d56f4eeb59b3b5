use super::Aggregator;
use crate::item::Data;

/// Combine two aggregators over the same input into one producing a pair of
/// results. Supports `deduct` iff both constituents do.
pub fn tuple2<T, A1, R1, A2, R2>(
    left: Aggregator<T, A1, R1>,
    right: Aggregator<T, A2, R2>,
) -> Aggregator<T, (A1, A2), (R1, R2)>
where
    T: Data,
    A1: Data,
    R1: Data,
    A2: Data,
    R2: Data,
{
    let can_deduct = left.can_deduct() && right.can_deduct();

    let create_l = left.clone();
    let create_r = right.clone();
    let acc_l = left.clone();
    let acc_r = right.clone();
    let comb_l = left.clone();
    let comb_r = right.clone();
    let fin_l = left.clone();
    let fin_r = right.clone();

    let combined = Aggregator::new(
        move || (create_l.create(), create_r.create()),
        move |(a1, a2), item| (acc_l.accumulate(a1, item), acc_r.accumulate(a2, item)),
        move |(a1, b1), (a2, b2)| (comb_l.combine(a1, a2), comb_r.combine(b1, b2)),
        move |(a1, a2)| (fin_l.finish(a1), fin_r.finish(a2)),
    );

    if can_deduct {
        let ded_l = left.clone();
        let ded_r = right.clone();
        let empty_l = left;
        let empty_r = right;
        combined.with_deduct(
            move |(a1, b1), (a2, b2)| (ded_l.deduct(a1, a2), ded_r.deduct(b1, b2)),
            move |(a1, a2)| empty_l.is_empty(a1) && empty_r.is_empty(a2),
        )
    } else {
        combined
    }
}

/// Combine three aggregators over the same input into one producing a
/// triple of results. Supports `deduct` iff every constituent does.
pub fn tuple3<T, A1, R1, A2, R2, A3, R3>(
    first: Aggregator<T, A1, R1>,
    second: Aggregator<T, A2, R2>,
    third: Aggregator<T, A3, R3>,
) -> Aggregator<T, (A1, A2, A3), (R1, R2, R3)>
where
    T: Data,
    A1: Data,
    R1: Data,
    A2: Data,
    R2: Data,
    A3: Data,
    R3: Data,
{
    let can_deduct = first.can_deduct() && second.can_deduct() && third.can_deduct();

    let create_1 = first.clone();
    let create_2 = second.clone();
    let create_3 = third.clone();
    let acc_1 = first.clone();
    let acc_2 = second.clone();
    let acc_3 = third.clone();
    let comb_1 = first.clone();
    let comb_2 = second.clone();
    let comb_3 = third.clone();
    let fin_1 = first.clone();
    let fin_2 = second.clone();
    let fin_3 = third.clone();

    let combined = Aggregator::new(
        move || (create_1.create(), create_2.create(), create_3.create()),
        move |(a1, a2, a3), item| {
            (
                acc_1.accumulate(a1, item),
                acc_2.accumulate(a2, item),
                acc_3.accumulate(a3, item),
            )
        },
        move |(a1, b1, c1), (a2, b2, c2)| {
            (
                comb_1.combine(a1, a2),
                comb_2.combine(b1, b2),
                comb_3.combine(c1, c2),
            )
        },
        move |(a1, a2, a3)| (fin_1.finish(a1), fin_2.finish(a2), fin_3.finish(a3)),
    );

    if can_deduct {
        let ded_1 = first.clone();
        let ded_2 = second.clone();
        let ded_3 = third.clone();
        let empty_1 = first;
        let empty_2 = second;
        let empty_3 = third;
        combined.with_deduct(
            move |(a1, b1, c1), (a2, b2, c2)| {
                (
                    ded_1.deduct(a1, a2),
                    ded_2.deduct(b1, b2),
                    ded_3.deduct(c1, c2),
                )
            },
            move |(a1, a2, a3)| empty_1.is_empty(a1) && empty_2.is_empty(a2) && empty_3.is_empty(a3),
        )
    } else {
        combined
    }
}
